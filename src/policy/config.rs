use crate::core::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 6;
/// Default cap for a single backoff delay.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Default delay coefficient.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default growth factor between consecutive delays.
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;
/// Default upper bound of the random jitter multiplier.
pub const DEFAULT_RANDOM_FACTOR: f64 = 1.1;

/// Retry budget and backoff shape for an execution strategy.
///
/// The delay before retry `n` (0-based) is
///
/// ```text
/// min(base_delay * (exponential_base^n - 1) * jitter, max_retry_delay)
/// jitter = 1 + U[0, 1) * (random_factor - 1)
/// ```
///
/// so the first retry happens immediately and later ones back off
/// exponentially. With defaults: 0s, ~1s, ~3s, ~7s, ~15s, ~30s.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use memodb_resilience::RetryConfig;
///
/// let config = RetryConfig::new()
///     .max_retry_count(3)
///     .base_delay(Duration::from_millis(50))
///     .max_retry_delay(Duration::from_secs(2));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries. `0` disables retrying.
    pub max_retry_count: u32,

    /// Delay coefficient in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay between two attempts in milliseconds.
    pub max_retry_delay_ms: u64,

    /// Growth factor of the exponential backoff.
    pub exponential_base: f64,

    /// Upper bound of the jitter multiplier (`>= 1.0`).
    pub random_factor: f64,

    /// Total wall-clock budget for one logical call, including delays.
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY.as_millis() as u64,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            random_factor: DEFAULT_RANDOM_FACTOR,
            max_elapsed_ms: None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that runs every operation exactly once.
    pub fn no_retry() -> Self {
        Self::default().max_retry_count(0)
    }

    /// Parse from a JSON document, e.g. a section of application settings.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set maximum number of retries
    pub fn max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    /// Set the delay coefficient
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the maximum delay between attempts
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the exponential growth factor
    pub fn exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Set the jitter upper bound
    pub fn random_factor(mut self, factor: f64) -> Self {
        self.random_factor = factor;
        self
    }

    /// Set the total time budget of one logical call
    pub fn max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed_ms = Some(budget.as_millis() as u64);
        self
    }

    /// Total number of attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retry_count.saturating_add(1)
    }

    pub fn retries_on_failure(&self) -> bool {
        self.max_retry_count > 0
    }

    pub fn get_base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn get_max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn get_max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_ms.map(Duration::from_millis)
    }

    /// Samples the delay before retry `retry_index` (0-based).
    pub fn next_delay(&self, retry_index: u32) -> Duration {
        let jitter = rand::rng().random::<f64>();
        self.delay_with_jitter(retry_index, jitter)
    }

    /// Deterministic part of [`next_delay`](Self::next_delay); `jitter` is the
    /// uniform sample in `[0, 1)`.
    pub fn delay_with_jitter(&self, retry_index: u32, jitter: f64) -> Duration {
        let cap = self.get_max_retry_delay();
        let exponent = retry_index.min(i32::MAX as u32) as i32;
        let growth = self.exponential_base.powi(exponent) - 1.0;
        let multiplier = 1.0 + jitter.clamp(0.0, 1.0) * (self.random_factor - 1.0);
        let secs = self.get_base_delay().as_secs_f64() * growth * multiplier;

        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            return Err(ConfigError::Invalid(
                "exponential_base must be a finite number >= 1.0".to_string(),
            ));
        }

        if !self.random_factor.is_finite() || self.random_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "random_factor must be a finite number >= 1.0".to_string(),
            ));
        }

        if self.base_delay_ms > self.max_retry_delay_ms {
            return Err(ConfigError::Invalid(
                "base_delay cannot exceed max_retry_delay".to_string(),
            ));
        }

        if self.max_elapsed_ms == Some(0) {
            return Err(ConfigError::Invalid("max_elapsed must be > 0".to_string()));
        }

        Ok(())
    }
}
