//! Retry policy and request logging controls for the Box HTTP client.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest share of the delay that jitter adds or removes.
const JITTER_FRACTION: f64 = 0.25;

/// Configuration for retry behavior with exponential backoff.
///
/// Retries are bounded: once `max_retries` is spent the last response is
/// surfaced to the caller as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds (default: 500).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds (default: 30000).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier (default: 2.0).
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff (default: true).
    #[serde(default = "default_use_jitter")]
    pub use_jitter: bool,

    /// HTTP status codes that trigger a retry inside the client.
    #[serde(default = "default_retry_status_codes")]
    pub retry_status_codes: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_use_jitter() -> bool {
    true
}

fn default_retry_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            use_jitter: default_use_jitter(),
            retry_status_codes: default_retry_status_codes(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max retries.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Set initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set max backoff.
    #[must_use]
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Turn jitter off, making backoff deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Wait before retry `attempt` (1-based): exponential growth capped at
    /// `max_backoff_ms`, spread by up to 25% either way when jitter is on.
    #[must_use]
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let capped = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);

        let delay_ms = if self.use_jitter && capped > 0.0 {
            let spread = capped * JITTER_FRACTION;
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Check if a status code should trigger a retry.
    #[must_use]
    pub fn should_retry(&self, status_code: u16) -> bool {
        self.retry_status_codes.contains(&status_code)
    }
}


/// Parse a `Retry-After` header given in seconds.
///
/// Box only sends the delta-seconds form.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Logging verbosity level for request/response logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    /// No request/response logging.
    Quiet,
    /// Log method, path and status only (default).
    #[default]
    Normal,
    /// Also log query parameters.
    Verbose,
    /// Also log request and response bodies.
    Debug,
}

impl LogVerbosity {
    /// Check if query parameters should be logged.
    #[must_use]
    pub fn log_query(&self) -> bool {
        matches!(self, LogVerbosity::Verbose | LogVerbosity::Debug)
    }

    /// Check if bodies should be logged.
    #[must_use]
    pub fn log_bodies(&self) -> bool {
        matches!(self, LogVerbosity::Debug)
    }

    /// Check if any logging should occur.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, LogVerbosity::Quiet)
    }
}
