//! WAGERBOOK: simulated sportsbook.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the store and sportsbook, seeds the demo schedule and serves
//! the HTTP API until Ctrl+C.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use wagerbook::api;
use wagerbook::config::{AppConfig, StorageBackend};
use wagerbook::demo;
use wagerbook::engine::{SimulatedOutcomes, Sportsbook};
use wagerbook::storage::{MemoryStore, SqliteStore};
use wagerbook::types::WagerError;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::path_from_env();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        name = %cfg.book.name,
        currency = %cfg.book.currency,
        starting_bankroll = %cfg.book.starting_bankroll,
        backend = ?cfg.storage.backend,
        config = %config_path,
        "WAGERBOOK starting up"
    );

    let book = Arc::new(build_book(&cfg).await?);

    if cfg.book.seed_demo_games {
        let games = demo::demo_games(Utc::now());
        let mut seeded = 0;
        for game in &games {
            match book.upsert_game(game).await {
                Ok(()) => seeded += 1,
                // Already resolved in a persisted store from an earlier run.
                Err(WagerError::ResultConflict { game_id, message }) => {
                    warn!(game_id, %message, "Demo game left as stored");
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to seed demo game {}", game.id));
                }
            }
        }
        info!(games = seeded, "Demo schedule seeded");
    }

    if cfg.api.enabled {
        api::serve(book, cfg.api.port, shutdown_signal()).await?;
    } else {
        warn!("API disabled; nothing to serve. Waiting for Ctrl+C.");
        shutdown_signal().await;
    }

    info!("WAGERBOOK shut down cleanly.");
    Ok(())
}

async fn build_book(cfg: &AppConfig) -> Result<Sportsbook> {
    let outcomes = Arc::new(SimulatedOutcomes::new(cfg.simulation.seed));
    let settings = cfg.book_settings();

    let book = match cfg.storage.backend {
        StorageBackend::Memory => {
            Sportsbook::with_store(Arc::new(MemoryStore::new()), outcomes, settings)
        }
        StorageBackend::Sqlite => {
            let url = cfg
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the sqlite backend")?;
            let store = SqliteStore::connect(url)
                .await
                .with_context(|| format!("Failed to open database {url}"))?;
            Sportsbook::with_store(Arc::new(store), outcomes, settings)
        }
    };
    Ok(book)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wagerbook=info"));

    let json_logging = std::env::var("WAGERBOOK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
