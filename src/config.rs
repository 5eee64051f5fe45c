use std::net::SocketAddr;

use crate::clock::DEFAULT_MAX_DRIFT_US;

/// Server configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub max_clock_drift_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// DATABASE_URL defaults to "sqlite://notesync.db"
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://notesync.db".to_string());

        let listen_addr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LISTEN_ADDR", "must be a valid socket address"))?;

        let max_clock_drift_ms = match lookup("MAX_CLOCK_DRIFT_MS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("MAX_CLOCK_DRIFT_MS", "must be a valid u64"))?,
            None => (DEFAULT_MAX_DRIFT_US / 1000) as u64,
        };

        Ok(Config {
            listen_addr,
            database_url,
            max_clock_drift_ms,
        })
    }

    pub fn max_clock_drift_us(&self) -> i64 {
        i64::try_from(self.max_clock_drift_ms.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
