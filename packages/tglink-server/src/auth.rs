//! Credential verification.
//!
//! Accounts authenticate with an HS256 JWT in `Authorization: Bearer <jwt>`.
//! The [`AuthUser`] extractor verifies it against the configured secret and
//! hands the account identity to the handler.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{BindError, Result};
use crate::state::AppState;

/// Lifetime of credentials minted by [`issue_token`].
pub const CREDENTIAL_TTL_DAYS: i64 = 7;

/// JWT claims carried by an account credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub account_id: i64,
    pub email: String,
}

/// Mint a credential for an account.
pub fn issue_token(secret: &str, user_id: i64, email: &str) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        user_id,
        email: email.to_string(),
        exp: (now + Duration::days(CREDENTIAL_TTL_DAYS)).timestamp(),
        iat: now.timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to sign credential");
        BindError::AuthNotConfigured
    })
}

/// Verify a credential and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Credential rejected");
        BindError::Unauthorized
    })
}

/// Pull the token out of an `Authorization` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = BindError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(BindError::Unauthorized)?;
        let token = bearer_token(header_value).ok_or(BindError::Unauthorized)?;

        let secret = state
            .config
            .jwt_secret()
            .ok_or(BindError::AuthNotConfigured)?;
        let claims = verify_token(secret, token)?;

        Ok(AuthUser {
            account_id: claims.user_id,
            email: claims.email,
        })
    }
}
