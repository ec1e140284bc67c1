//! HTTP API: Axum server over the sportsbook.
//!
//! Serves a JSON REST API. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::AppState;

/// Bind `port` and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/accounts", post(routes::open_account))
        .route("/api/accounts/:id", get(routes::get_account))
        .route("/api/accounts/:id/stats", get(routes::get_stats))
        .route("/api/accounts/:id/wagers", get(routes::get_history))
        .route("/api/wagers", post(routes::place_wager))
        .route("/api/games", get(routes::get_games).put(routes::upsert_game))
        .route("/api/games/:id/events", post(routes::post_game_event))
        .route("/api/games/:id/simulate", post(routes::simulate_game))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
