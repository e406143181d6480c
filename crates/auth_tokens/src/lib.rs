//! Session tokens handed out at sign-in. A token carries the account id and
//! declared role so request handlers can gate routes without a lookup.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::{Role, UserId};
use thiserror::Error;

const ISSUER: &str = "dispatch";

#[derive(Debug, Clone)]
pub struct SessionTokenConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("invalid session token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("malformed token subject '{0}'")]
    Subject(String),
}

pub fn mint_token(
    cfg: &SessionTokenConfig,
    user_id: UserId,
    role: Role,
) -> Result<(String, DateTime<Utc>), TokenError> {
    let now = Utc::now();
    let expires_at = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        iss: ISSUER.to_string(),
        sub: format!("user:{user_id}"),
        role,
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
    .map_err(TokenError::Signing)?;
    Ok((token, expires_at))
}

pub fn verify_token(cfg: &SessionTokenConfig, token: &str) -> Result<SessionClaims, TokenError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[ISSUER]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &validation,
    )
    .map_err(TokenError::Invalid)?;

    let claims = data.claims;
    let user_id = claims
        .sub
        .strip_prefix("user:")
        .and_then(|raw| raw.parse::<UserId>().ok())
        .ok_or_else(|| TokenError::Subject(claims.sub.clone()))?;
    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .unwrap_or_else(Utc::now);

    Ok(SessionClaims {
        user_id,
        role: claims.role,
        expires_at,
    })
}

#[cfg(test)]
#[path = "tests/token_tests.rs"]
mod tests;
