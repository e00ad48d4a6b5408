//! Sync configuration parsed from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::consts::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESUBSCRIBE_BASE_MS, DEFAULT_RESUBSCRIBE_JITTER_MS, DEFAULT_RESUBSCRIBE_MAX_MS,
};
use crate::record::RecordId;
use crate::remote::ResubscribeConfig;

pub const DEFAULT_TABLE: &str = "scoreboards";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: &'static str },

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Backend base URL without trailing slash.
    pub backend_url: String,
    pub api_key: String,
    pub table: String,
    pub poll_interval: Duration,
    pub resubscribe: ResubscribeConfig,
    pub timeouts: HttpTimeouts,
}

impl SyncConfig {
    /// Build typed sync config from environment variables.
    ///
    /// Required:
    /// - `SCOREBOARD_BACKEND_URL`
    /// - `SCOREBOARD_API_KEY`
    ///
    /// Optional:
    /// - `SCOREBOARD_TABLE`: default `scoreboards`
    /// - `SCOREBOARD_POLL_INTERVAL_MS`: default 1000
    /// - `SCOREBOARD_RESUBSCRIBE_BASE_MS`: default 500
    /// - `SCOREBOARD_RESUBSCRIBE_MAX_MS`: default 10000
    /// - `SCOREBOARD_RESUBSCRIBE_JITTER_MS`: default 250
    /// - `SCOREBOARD_REQUEST_TIMEOUT_SECS`: default 10
    /// - `SCOREBOARD_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an absent required variable and
    /// [`ConfigError::Invalid`] for a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url = env_required("SCOREBOARD_BACKEND_URL")?
            .trim_end_matches('/')
            .to_string();
        let api_key = env_required("SCOREBOARD_API_KEY")?;
        let table = std::env::var("SCOREBOARD_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string());

        let resubscribe = ResubscribeConfig {
            base_ms: env_parse("SCOREBOARD_RESUBSCRIBE_BASE_MS", DEFAULT_RESUBSCRIBE_BASE_MS)?,
            max_ms: env_parse("SCOREBOARD_RESUBSCRIBE_MAX_MS", DEFAULT_RESUBSCRIBE_MAX_MS)?,
            jitter_ms: env_parse("SCOREBOARD_RESUBSCRIBE_JITTER_MS", DEFAULT_RESUBSCRIBE_JITTER_MS)?,
        };
        let timeouts = HttpTimeouts {
            request_secs: env_parse("SCOREBOARD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: env_parse("SCOREBOARD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };
        let poll_interval = Duration::from_millis(env_parse("SCOREBOARD_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?);

        Ok(Self { backend_url, api_key, table, poll_interval, resubscribe, timeouts })
    }
}

/// Record to watch, from `SCOREBOARD_RECORD_ID`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the variable is absent or not a UUID.
pub fn record_id_from_env() -> Result<RecordId, ConfigError> {
    let var = "SCOREBOARD_RECORD_ID";
    let raw = env_required(var)?;
    RecordId::parse_str(raw.trim()).map_err(|_| ConfigError::Invalid { var, value: raw })
}

fn env_required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { var }),
    }
}

fn env_parse<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var, value: raw.clone() }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
