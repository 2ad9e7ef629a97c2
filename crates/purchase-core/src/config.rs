//! Polling Configuration

use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How often and how many times the helper asks for an operation's status
///
/// Total wait before giving up is `interval * max_attempts`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingConfig {
    /// Delay between consecutive status polls
    pub interval: Duration,

    /// Status polls before reporting a timeout
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollingConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::OutOfRange(
                "max_attempts must be at least 1".into(),
            ));
        }
        if interval.is_zero() {
            return Err(ConfigError::OutOfRange(
                "poll interval must be greater than zero".into(),
            ));
        }

        Ok(Self {
            interval,
            max_attempts,
        })
    }

    /// Read `PURCHASE_POLL_INTERVAL_MS` and `PURCHASE_POLL_MAX_ATTEMPTS`,
    /// falling back to defaults for unset variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval_ms = env_or("PURCHASE_POLL_INTERVAL_MS", DEFAULT_INTERVAL_MS)?;
        let max_attempts = env_or("PURCHASE_POLL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;

        Self::new(Duration::from_millis(interval_ms), max_attempts)
    }

    /// Upper bound on time spent polling one session
    pub fn total_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Parse an environment variable, falling back to `default` when unset
pub fn env_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}
