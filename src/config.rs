//! Configuration loading from TOML.
//!
//! Reads `config.toml` (or the file named by `WAGERBOOK_CONFIG`) and
//! deserializes into strongly-typed structs. Every section has defaults,
//! so a partial file is enough.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::engine::BookSettings;
use crate::types::check_amount;

/// Env var that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "WAGERBOOK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BookConfig {
    pub name: String,
    pub currency: String,
    /// Balance given to accounts opened without an explicit amount.
    pub starting_bankroll: Decimal,
    /// Upsert the demo schedule at startup.
    pub seed_demo_games: bool,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            name: "WAGERBOOK".to_string(),
            currency: "USD".to_string(),
            starting_bankroll: Decimal::from(1000),
            seed_demo_games: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// sqlx connection string, e.g. `sqlite://wagerbook.db`.
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettlementConfig {
    /// Upper bound on wagers graded concurrently in one sweep.
    pub max_parallel: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { max_parallel: 8 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed seed for reproducible simulated scores.
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Path from `WAGERBOOK_CONFIG`, falling back to `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let bankroll = self.book.starting_bankroll;
        if bankroll < Decimal::ZERO {
            bail!("book.starting_bankroll must be non-negative, got {bankroll}");
        }
        check_amount("book.starting_bankroll", bankroll)?;
        if self.settlement.max_parallel == 0 {
            bail!("settlement.max_parallel must be at least 1");
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.database_url.is_none() {
            bail!("storage.database_url is required for the sqlite backend");
        }
        Ok(())
    }

    pub fn book_settings(&self) -> BookSettings {
        BookSettings {
            starting_bankroll: self.book.starting_bankroll,
            max_parallel: self.settlement.max_parallel,
        }
    }
}
