//! Authentication extractors.
//!
//! Identity arrives as a bearer token and is verified by the black-box
//! `AuthService`. `Authenticated` accepts any valid token; `OperatorAuth`
//! additionally requires the operator role.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::services::{AuthError, Identity};
use crate::AppState;

/// Any authenticated caller.
pub struct Authenticated(pub Identity);

/// An authenticated caller with operator role.
pub struct OperatorAuth(pub Identity);

fn bearer_identity(parts: &Parts, state: &AppState) -> Result<Identity, AuthError> {
    let header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Unauthorized)?;

    state.auth.verify_token(token).ok_or(AuthError::Unauthorized)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Authenticated(bearer_identity(parts, state)?))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = bearer_identity(parts, state)?;
        if !identity.is_operator() {
            return Err(AuthError::Forbidden);
        }
        Ok(OperatorAuth(identity))
    }
}
