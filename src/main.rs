use axum::{routing::get, Router};
use mirage::config::Config;
use mirage::services::{
    AuthService, NotificationBus, PolicyStore, PriceFeed, SettlementScheduler, TradeLedger,
    TradeService,
};
use mirage::websocket::{self, ConnectionRegistry};
use mirage::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirage=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting Mirage server on {}:{}", config.host, config.port);

    // Ledger is the single durable store: balances, trades, policies
    let ledger = Arc::new(TradeLedger::new(&config.database_path)?);

    let auth = Arc::new(AuthService::new(&config.auth_secret));
    let policies = PolicyStore::new(ledger.clone(), config.default_policy);
    let feed = Arc::new(PriceFeed::new());

    // Connection registry and notification bus for result push
    let registry = ConnectionRegistry::new();
    let notifier = NotificationBus::new(registry.clone());

    let scheduler = SettlementScheduler::new(
        ledger.clone(),
        policies.clone(),
        feed.clone(),
        notifier,
    );

    // Reconcile trades left active by a previous process: overdue ones
    // settle immediately, the rest get their timers re-armed
    let recovered = scheduler.recover()?;
    if recovered > 0 {
        info!("Settlement scheduler recovered {} trades", recovered);
    }

    let trade_service = TradeService::new(
        config.limits.clone(),
        ledger.clone(),
        scheduler.clone(),
        feed.clone(),
    );

    // Periodic reconciliation sweep: a trade whose in-process timer was lost
    // still settles within one interval of its expiry
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
                if let Err(e) = scheduler.recover() {
                    tracing::error!("Reconciliation sweep failed: {}", e);
                }
            }
        });
    }

    // Create application state
    let state = AppState {
        config: config.clone(),
        auth,
        ledger,
        policies,
        feed,
        registry,
        scheduler,
        trade_service,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .merge(mirage::api::router())
        .route("/ws", get(websocket::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mirage server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
