// almanac-market - ledger-derived binary prediction market server

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

mod api;
mod app_state;
mod config;
mod directory;
mod exchange;
mod handlers;
mod ledger;
mod market;
mod notify;
mod pricing;

use app_state::AppState;
use config::EngineConfig;
use handlers::ServerState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = EngineConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    let app_state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to open ledger");
            std::process::exit(1);
        }
    };
    let notifier = app_state.notifier();
    let shared = app_state.into_shared();
    let shutdown_state = shared.clone();

    let server_state = ServerState {
        app: shared,
        notifier,
    };

    let app = Router::new()
        // ===== TRADING =====
        .route("/api/trade", post(handlers::execute_trade))
        .route("/api/preview", get(handlers::preview_trade))
        .route("/api/balance/:handle", get(handlers::get_balance))
        // ===== MARKETS =====
        .route("/api/markets", get(handlers::list_markets))
        .route("/api/markets", post(handlers::create_market))
        .route("/api/markets/:id", get(handlers::market_detail))
        .route("/api/markets/:id/resolve", post(handlers::resolve_market))
        .route("/api/markets/:id/unresolve", post(handlers::unresolve_market))
        // ===== USERS =====
        .route("/api/users", post(handlers::register_user))
        // ===== HEALTH =====
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(server_state);

    // Snapshot market metadata on ctrl-c; the ledger file is always
    // current so nothing else needs flushing.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, saving state");
            if let Ok(state) = shutdown_state.lock() {
                state.save_to_disk_best_effort();
            }
            std::process::exit(0);
        }
    });

    info!(addr = %bind_addr, "almanac-market listening");

    let listener = match tokio::net::TcpListener::bind(bind_addr.as_str()).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
    }
}
