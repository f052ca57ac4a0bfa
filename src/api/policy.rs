//! Policy API
//!
//! Operator-only settlement policy configuration:
//!
//! - GET    /api/policy          - Global policy
//! - PUT    /api/policy          - Replace the global policy
//! - GET    /api/policy/:user_id - A user's override + effective policy
//! - PUT    /api/policy/:user_id - Set a per-user override
//! - DELETE /api/policy/:user_id - Clear a per-user override

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::auth::OperatorAuth;
use crate::types::{PolicyError, TradePolicy};
use crate::AppState;

/// Create the policy router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_global).put(set_global))
        .route("/:user_id", get(get_user))
        .route("/:user_id", put(set_user))
        .route("/:user_id", delete(clear_user))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Convert PolicyError to HTTP response.
impl IntoResponse for PolicyError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            PolicyError::InvalidWinRate(_) => (StatusCode::BAD_REQUEST, "INVALID_WIN_RATE"),
            PolicyError::InvalidProfitRange { .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_PROFIT_RANGE")
            }
            PolicyError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// A user's policy view: the override if set, and what settlement will
/// actually use.
#[derive(Debug, Serialize)]
pub struct UserPolicyResponse {
    pub user_id: String,
    #[serde(rename = "override")]
    pub override_policy: Option<TradePolicy>,
    pub effective: TradePolicy,
}

/// GET /api/policy
async fn get_global(
    State(state): State<AppState>,
    _auth: OperatorAuth,
) -> Json<ApiResponse<TradePolicy>> {
    Json(ApiResponse {
        data: state.policies.global(),
    })
}

/// PUT /api/policy
async fn set_global(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Json(policy): Json<TradePolicy>,
) -> Result<Json<ApiResponse<TradePolicy>>, PolicyError> {
    state.policies.set_global(policy)?;
    Ok(Json(ApiResponse { data: policy }))
}

/// GET /api/policy/:user_id
async fn get_user(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(user_id): Path<String>,
) -> Json<ApiResponse<UserPolicyResponse>> {
    Json(ApiResponse {
        data: UserPolicyResponse {
            override_policy: state.policies.user_override(&user_id),
            effective: state.policies.for_user(&user_id),
            user_id,
        },
    })
}

/// PUT /api/policy/:user_id
async fn set_user(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(user_id): Path<String>,
    Json(policy): Json<TradePolicy>,
) -> Result<Json<ApiResponse<TradePolicy>>, PolicyError> {
    state.policies.set_user(&user_id, policy)?;
    Ok(Json(ApiResponse { data: policy }))
}

/// DELETE /api/policy/:user_id
async fn clear_user(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<TradePolicy>>, PolicyError> {
    state.policies.clear_user(&user_id)?;
    Ok(Json(ApiResponse {
        data: state.policies.global(),
    }))
}
