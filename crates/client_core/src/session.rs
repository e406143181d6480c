//! Who is signed in, and which screen they are allowed to reach.
//!
//! There is exactly one [`SessionGate`] per process. Flows never read it
//! implicitly; callers take an [`Identity`] out of it and hand that to the
//! flow they construct.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{Identity, Role},
    protocol::SessionResponse,
};
use tokio::sync::watch;

pub trait IdentitySource: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}

/// A signed-in account together with the bearer token the server issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionResponse> for Session {
    fn from(value: SessionResponse) -> Self {
        Self {
            token: value.token,
            identity: value.identity,
            expires_at: value.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct SessionGate {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for SessionGate {
    fn current_identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Driver,
    Hospital,
}

impl Route {
    pub fn is_protected(self) -> bool {
        !matches!(self, Route::Login)
    }
}

/// Protected routes are only reachable with an identity present.
pub fn gate(requested: Route, identity: Option<&Identity>) -> Route {
    match identity {
        None if requested.is_protected() => Route::Login,
        _ => requested,
    }
}

pub fn home_route(identity: Option<&Identity>) -> Route {
    match identity.map(|identity| identity.role) {
        Some(Role::Driver) => Route::Driver,
        Some(Role::Hospital) => Route::Hospital,
        None => Route::Login,
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
