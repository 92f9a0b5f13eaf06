// Configuration - built once at startup and passed down explicitly
//
// Sources, lowest priority first: built-in defaults, process environment
// (after loading `.env` via dotenvy), CLI flags (applied in main.rs).

use crate::error::ConfigError;
use crate::logging::{LogConfig, LogFormat, LogLevel};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATABASE_PATH: &str = "RECON_DATABASE_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "RECON_BUSY_TIMEOUT_MS";
pub const ENV_COMPANY_ID: &str = "RECON_COMPANY_ID";
pub const ENV_ERROR_DISPLAY_LIMIT: &str = "RECON_ERROR_DISPLAY_LIMIT";
pub const ENV_LOG_LEVEL: &str = "RECON_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "RECON_LOG_FORMAT";

pub const DEFAULT_DATABASE_PATH: &str = "invoice_reconciliation.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_COMPANY_ID: i64 = 1;
pub const DEFAULT_ERROR_DISPLAY_LIMIT: usize = 10;

/// Where and how the SQLite store is opened
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// Company new invoices are attached to unless overridden
    pub company_id: i64,
    /// How many validation errors to print; all are kept regardless
    pub error_display_limit: usize,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            store: StoreConfig::default(),
            company_id: DEFAULT_COMPANY_ID,
            error_display_limit: DEFAULT_ERROR_DISPLAY_LIMIT,
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            config.store.path = PathBuf::from(path);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_BUSY_TIMEOUT_MS)? {
            config.store.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(id) = parse_var(&lookup, ENV_COMPANY_ID)? {
            config.company_id = id;
        }
        if let Some(limit) = parse_var(&lookup, ENV_ERROR_DISPLAY_LIMIT)? {
            config.error_display_limit = limit;
        }
        if let Some(level) = parse_var::<LogLevel, _>(&lookup, ENV_LOG_LEVEL)? {
            config.log.level = level;
        }
        if let Some(format) = parse_var::<LogFormat, _>(&lookup, ENV_LOG_FORMAT)? {
            config.log.format = format;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
