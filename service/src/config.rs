//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use tally_ledger::{LedgerConfig, RetryPolicy};

/// Jitter applied to conflict backoff.
const RETRY_JITTER_PCT: f64 = 0.2;

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Connection pool size.
    pub database_max_connections: u32,
    /// CBR `daily_json` document loaded into the rate table at start-up.
    pub rates_file: Option<PathBuf>,
    /// URL the same document is fetched from when no file is given.
    pub rates_url: Option<String>,
    /// Deadline for each ledger operation.
    pub operation_timeout: Duration,
    /// Attempts per operation when writes conflict.
    pub max_attempts: usize,
    /// First conflict backoff.
    pub retry_base: Duration,
    /// Backoff ceiling.
    pub retry_max: Duration,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            rates_file: None,
            rates_url: None,
            operation_timeout: Duration::from_millis(5000),
            max_attempts: 5,
            retry_base: Duration::from_millis(5),
            retry_max: Duration::from_millis(200),
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = Some(url);
        }

        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.database_max_connections = max;
            }
        }

        if let Some(path) = lookup("RATES_FILE") {
            config.rates_file = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("RATES_URL") {
            config.rates_url = Some(url);
        }

        if let Some(ms) = lookup("LEDGER_OPERATION_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.operation_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(attempts) = lookup("LEDGER_MAX_RETRIES") {
            if let Ok(attempts) = attempts.parse() {
                config.max_attempts = attempts;
            }
        }

        if let Some(ms) = lookup("LEDGER_RETRY_BASE_MS") {
            if let Ok(ms) = ms.parse() {
                config.retry_base = Duration::from_millis(ms);
            }
        }

        if let Some(ms) = lookup("LEDGER_RETRY_MAX_MS") {
            if let Ok(ms) = ms.parse() {
                config.retry_max = Duration::from_millis(ms);
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(&self.database_url, Some(url) if url.trim().is_empty()) {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.rates_file.is_some() && self.rates_url.is_some() {
            return Err("Set only one of RATES_FILE and RATES_URL".to_string());
        }

        if matches!(&self.rates_url, Some(url) if url.trim().is_empty()) {
            return Err("Rates URL cannot be empty".to_string());
        }

        if self.database_max_connections == 0 {
            return Err("Database pool size cannot be 0".to_string());
        }

        if self.operation_timeout.is_zero() {
            return Err("Operation timeout cannot be 0".to_string());
        }

        if self.max_attempts == 0 {
            return Err("Retry attempts cannot be 0".to_string());
        }

        if self.retry_base > self.retry_max {
            return Err("Retry base delay cannot exceed max delay".to_string());
        }

        Ok(())
    }

    /// True when accounts live only as long as the process.
    pub fn is_ephemeral(&self) -> bool {
        self.database_url.is_none()
    }

    /// Engine tuning derived from this configuration.
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            operation_timeout: self.operation_timeout,
            retry: RetryPolicy::new(
                self.max_attempts,
                self.retry_base,
                self.retry_max,
                RETRY_JITTER_PCT,
            ),
        }
    }
}
