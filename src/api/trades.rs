//! Trading API
//!
//! - POST /api/trades            - Create a timed trade (escrow + arm)
//! - GET  /api/trades/active     - List the caller's active trades
//! - GET  /api/trades/history    - Paginated trade history, newest first
//! - POST /api/trades/:id/settle - Operator early settlement, optional
//!                                 forced outcome

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::{Authenticated, OperatorAuth};
use crate::services::{LedgerError, TradeError};
use crate::types::{CreateTradeRequest, Trade, TradeHistoryPage, TradeOutcome};
use crate::AppState;

/// Create the trades router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_trade))
        .route("/active", get(list_active))
        .route("/history", get(list_history))
        .route("/:id/settle", post(force_settle))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Convert TradeError to HTTP response.
impl IntoResponse for TradeError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            TradeError::InvalidDuration(_) => (StatusCode::BAD_REQUEST, "INVALID_DURATION"),
            TradeError::StakeOutOfRange { .. } => {
                (StatusCode::BAD_REQUEST, "STAKE_OUT_OF_RANGE")
            }
            TradeError::UnknownPair(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_PAIR"),
            TradeError::Ledger(LedgerError::InsufficientBalance { .. }) => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
            }
            TradeError::Ledger(LedgerError::TradeNotFound(_)) => {
                (StatusCode::NOT_FOUND, "TRADE_NOT_FOUND")
            }
            TradeError::Ledger(LedgerError::AlreadySettled(_)) => {
                (StatusCode::CONFLICT, "ALREADY_SETTLED")
            }
            TradeError::Ledger(LedgerError::Database(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/trades
///
/// Create a trade for the authenticated user. Validation, escrow, and timer
/// arming all happen before this returns; only settlement is deferred.
async fn create_trade(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<CreateTradeRequest>,
) -> Result<Json<ApiResponse<Trade>>, TradeError> {
    let trade = state.trade_service.create_trade(&auth.0.user_id, request)?;
    Ok(Json(ApiResponse { data: trade }))
}

/// GET /api/trades/active
async fn list_active(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<Trade>>>, TradeError> {
    let trades = state.trade_service.list_active(&auth.0.user_id)?;
    Ok(Json(ApiResponse { data: trades }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /api/trades/history?page=1&limit=10
async fn list_history(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<TradeHistoryPage>>, TradeError> {
    let page = state.trade_service.list_history(
        &auth.0.user_id,
        query.page.unwrap_or(1),
        query.limit.unwrap_or(10),
    )?;
    Ok(Json(ApiResponse { data: page }))
}

#[derive(Debug, Deserialize)]
pub struct ForceSettleRequest {
    /// When present, overrides the policy draw for this settlement.
    #[serde(default)]
    pub outcome: Option<TradeOutcome>,
}

/// POST /api/trades/:id/settle
///
/// Operator early settlement. Cancels the pending timer and settles through
/// the normal path; settling an already-settled trade returns 409.
async fn force_settle(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(id): Path<String>,
    Json(request): Json<ForceSettleRequest>,
) -> Result<Json<ApiResponse<Trade>>, TradeError> {
    let settled = state
        .scheduler
        .settle_now(&id, request.outcome)
        .map_err(TradeError::Ledger)?;
    Ok(Json(ApiResponse {
        data: settled.trade,
    }))
}
