use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Identity, Role},
    error::ApiException,
    protocol::{SessionResponse, SignInRequest, SignUpRequest},
    validation::{validate_credentials, ValidationError},
};
use tracing::{info, warn};

use crate::{
    error::{describe, AuthError, ClientError},
    session::{Session, SessionGate},
    transport::{expect_success, ServerEndpoint},
};

/// Signs accounts up and in, and keeps the process [`SessionGate`] current.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    endpoint: ServerEndpoint,
    gate: SessionGate,
}

impl AuthClient {
    pub fn new(endpoint: ServerEndpoint, gate: SessionGate) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            gate,
        }
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
        role: Role,
    ) -> Result<Identity, ClientError> {
        validate_credentials(email, password)?;
        if username.trim().is_empty() {
            return Err(ValidationError::MissingUsername.into());
        }
        let request = SignUpRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            username: username.trim().to_string(),
            role,
        };
        let identity: Identity = self.post("auth/signup", &request).await?;
        info!(user_id = %identity.user_id, role = role.as_str(), "signed up");
        Ok(identity)
    }

    /// On success the gate publishes the new identity.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        validate_credentials(email, password)?;
        let request = SignInRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response: SessionResponse = self.post("auth/signin", &request).await?;
        let session = Session::from(response);
        self.gate.sign_in(session.identity.clone());
        info!(user_id = %session.identity.user_id, "signed in");
        Ok(session)
    }

    pub fn sign_out(&self) {
        self.gate.sign_out();
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self
            .endpoint
            .http(path)
            .map_err(|err| AuthError::Other(describe(&err)))?;
        let result = async {
            let response = self.http.post(url).json(body).send().await?;
            Ok::<T, anyhow::Error>(expect_success(response).await?.json().await?)
        }
        .await;

        result.map_err(|err| {
            let auth_error = match err.downcast_ref::<ApiException>() {
                Some(api) => AuthError::from_message(&api.message),
                None => AuthError::Other(describe(&err)),
            };
            warn!(error = %auth_error, "authentication request failed");
            ClientError::Auth(auth_error)
        })
    }
}
