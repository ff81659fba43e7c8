//! Sync Core Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};

/// Tunables for the sync core, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base delay for subscription retry backoff (default: 250ms)
    pub retry_base: Duration,

    /// Ceiling for subscription retry backoff (default: 30s)
    pub retry_max: Duration,

    /// Maximum message length in characters (default: 4000)
    pub max_message_len: usize,

    /// Upper bound on one page of message history (default: 100)
    pub history_page_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_base: Duration::from_millis(250),
            retry_max: Duration::from_secs(30),
            max_message_len: 4000,
            history_page_max: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Unset variables
    /// fall back to defaults; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            retry_base: parse_env("PARLOR_RETRY_BASE_MS")?
                .map_or(defaults.retry_base, Duration::from_millis),
            retry_max: parse_env("PARLOR_RETRY_MAX_MS")?
                .map_or(defaults.retry_max, Duration::from_millis),
            max_message_len: parse_env("PARLOR_MAX_MESSAGE_LEN")?
                .unwrap_or(defaults.max_message_len),
            history_page_max: parse_env("PARLOR_HISTORY_PAGE_MAX")?
                .unwrap_or(defaults.history_page_max),
        })
    }

    /// Create a configuration for testing, with backoff delays short
    /// enough that retry paths finish within a test timeout.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            retry_base: Duration::from_millis(5),
            retry_max: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("{name} must be a non-negative integer, got {raw:?}"),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry_base, Duration::from_millis(250));
        assert_eq!(config.max_message_len, 4000);
        assert_eq!(config.history_page_max, 100);
    }
}
