pub mod account;
pub mod auth;
pub mod health;
pub mod policy;
pub mod trades;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/account", account::router())
        .nest("/api/trades", trades::router())
        .nest("/api/policy", policy::router())
}
