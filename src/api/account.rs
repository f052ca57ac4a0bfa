//! Account API
//!
//! - GET /api/account/balance - The caller's current balance

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::auth::Authenticated;
use crate::services::TradeError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/balance", get(get_balance))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: f64,
}

/// GET /api/account/balance
///
/// Users with no ledger row yet (nothing deposited) read as zero.
async fn get_balance(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<BalanceResponse>>, TradeError> {
    let balance = state
        .ledger
        .balance(&auth.0.user_id)
        .map_err(TradeError::Ledger)?
        .unwrap_or(0.0);

    Ok(Json(ApiResponse {
        data: BalanceResponse {
            user_id: auth.0.user_id,
            balance,
        },
    }))
}
