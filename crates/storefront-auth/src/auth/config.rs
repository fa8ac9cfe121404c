//! Authentication configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the session cookie set by the backend.
    pub cookie_name: String,

    /// Retry a sync once after a transient network failure.
    pub retry_transient: bool,

    /// Delay before the transient retry, in milliseconds.
    pub retry_delay_ms: u64,

    /// A persisted credential expiring within this many seconds is treated as
    /// already expired.
    pub expiry_leeway_secs: i64,

    /// Provider label sent to the backend on social login.
    pub provider_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "token".to_string(),
            retry_transient: true,
            retry_delay_ms: 250,
            expiry_leeway_secs: 30,
            provider_name: "google".to_string(),
        }
    }
}

/// Upper bound for the retry delay.
const MAX_RETRY_DELAY_MS: u64 = 10_000;

impl AuthConfig {
    /// Delay before the transient retry.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Number of attempts a sync makes before surfacing a transient failure.
    pub fn sync_attempts(&self) -> u32 {
        if self.retry_transient { 2 } else { 1 }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let name = self.cookie_name.trim();
        if name.is_empty() {
            return Err(ConfigValidationError::EmptyCookieName);
        }
        if name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '=' | ','))
        {
            return Err(ConfigValidationError::InvalidCookieName(name.to_string()));
        }
        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigValidationError::RetryDelayTooLong(self.retry_delay_ms));
        }
        if self.expiry_leeway_secs < 0 {
            return Err(ConfigValidationError::NegativeLeeway);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Cookie name is empty.
    EmptyCookieName,
    /// Cookie name contains characters not allowed in a cookie name.
    InvalidCookieName(String),
    /// Retry delay exceeds the allowed maximum.
    RetryDelayTooLong(u64),
    /// Expiry leeway is negative.
    NegativeLeeway,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCookieName => write!(f, "auth.cookie_name must not be empty."),
            Self::InvalidCookieName(name) => {
                write!(f, "auth.cookie_name '{}' is not a valid cookie name.", name)
            }
            Self::RetryDelayTooLong(ms) => write!(
                f,
                "auth.retry_delay_ms is {} but must be at most {}.",
                ms, MAX_RETRY_DELAY_MS
            ),
            Self::NegativeLeeway => write!(f, "auth.expiry_leeway_secs must not be negative."),
        }
    }
}

impl std::error::Error for ConfigValidationError {}
