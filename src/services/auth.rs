//! Token verification.
//!
//! Identity is an external concern; this module is the engine-side boundary:
//! verify an opaque bearer token and hand back `{user_id, role}`. Tokens are
//! `user_id.role.signature` with an HMAC-SHA256 signature over
//! `user_id.role`, hex-encoded. `mint_token` exists for local tooling and
//! tests.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Caller role carried by the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Operator => "operator",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "operator" => Some(Role::Operator),
            _ => None,
        }
    }
}

/// Verified caller identity.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: operator role required")]
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Token verification service.
pub struct AuthService {
    secret: Vec<u8>,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Mint a signed token for a user and role.
    pub fn mint_token(&self, user_id: &str, role: Role) -> String {
        let payload = format!("{}.{}", user_id, role.as_str());
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", payload, sig)
    }

    /// Verify a token and return the identity it carries, if valid.
    pub fn verify_token(&self, token: &str) -> Option<Identity> {
        // Token layout from the right: signature, role, user_id. User ids
        // never contain dots (uuid v4).
        let mut parts = token.rsplitn(3, '.');
        let sig_hex = parts.next()?;
        let role_str = parts.next()?;
        let user_id = parts.next()?;
        if user_id.is_empty() {
            return None;
        }

        let role = Role::parse(role_str)?;
        let sig = hex::decode(sig_hex).ok()?;

        let payload = format!("{}.{}", user_id, role_str);
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).ok()?;

        Some(Identity {
            user_id: user_id.to_string(),
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_verify_round_trip() {
        let auth = AuthService::new("test-secret");
        let token = auth.mint_token("user-1", Role::User);

        let identity = auth.verify_token(&token).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.role, Role::User);
        assert!(!identity.is_operator());
    }

    #[test]
    fn test_operator_token() {
        let auth = AuthService::new("test-secret");
        let token = auth.mint_token("ops-1", Role::Operator);

        let identity = auth.verify_token(&token).unwrap();
        assert!(identity.is_operator());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = AuthService::new("test-secret");
        let token = auth.mint_token("user-1", Role::User);

        // Promote role without re-signing
        let forged = token.replace(".user.", ".operator.");
        assert!(auth.verify_token(&forged).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let minting = AuthService::new("secret-a");
        let verifying = AuthService::new("secret-b");

        let token = minting.mint_token("user-1", Role::User);
        assert!(verifying.verify_token(&token).is_none());
    }

    #[test]
    fn test_garbage_tokens_rejected() {
        let auth = AuthService::new("test-secret");
        assert!(auth.verify_token("").is_none());
        assert!(auth.verify_token("not-a-token").is_none());
        assert!(auth.verify_token("a.b").is_none());
        assert!(auth.verify_token("user-1.superuser.deadbeef").is_none());
        assert!(auth.verify_token("user-1.user.nothex!").is_none());
    }
}
