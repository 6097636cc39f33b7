use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_MAX_DELAY_SECS: f64 = 30.0;
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

/// Exponential backoff policy for retrying a plugin body.
///
/// Attempt 1 is the initial invocation; the delay before attempt `k` (k >= 2) is
/// `min(base_delay * exponential_base^(k-2), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,

    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    #[serde(default = "default_retryable_kinds")]
    pub retryable_kinds: BTreeSet<ErrorKind>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_secs() -> f64 {
    DEFAULT_BASE_DELAY_SECS
}

fn default_max_delay_secs() -> f64 {
    DEFAULT_MAX_DELAY_SECS
}

fn default_exponential_base() -> f64 {
    DEFAULT_EXPONENTIAL_BASE
}

fn default_retryable_kinds() -> BTreeSet<ErrorKind> {
    [ErrorKind::Network, ErrorKind::Timeout, ErrorKind::Resource]
        .into_iter()
        .collect()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            exponential_base: default_exponential_base(),
            retryable_kinds: default_retryable_kinds(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default exponential base and retryable kinds.
    pub fn new(max_attempts: u32, base_delay_secs: f64, max_delay_secs: f64) -> Self {
        Self {
            max_attempts,
            base_delay_secs,
            max_delay_secs,
            ..Self::default()
        }
    }

    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Effective attempt budget; a zero in config still means one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether a failure of `kind` earns another attempt.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }

    /// Delay in seconds before `attempt` (1-based). The first attempt never waits.
    pub fn delay_secs(&self, attempt: u32) -> f64 {
        if attempt < 2 {
            return 0.0;
        }
        let exp = (attempt - 2).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_secs * self.exponential_base.powi(exp);
        let clamped = if raw.is_finite() {
            raw.min(self.max_delay_secs)
        } else {
            self.max_delay_secs
        };
        clamped.max(0.0)
    }

    /// Saturates at `Duration::MAX` when the delay does not fit a `Duration`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs(attempt)).unwrap_or(Duration::MAX)
    }

    /// Delays must be finite and non-negative, and the exponential base at least 1.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (key, value) in [
            ("base_delay_secs", self.base_delay_secs),
            ("max_delay_secs", self.max_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("'{key}' must be a finite number >= 0, got {value}");
            }
        }
        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            anyhow::bail!(
                "'exponential_base' must be a finite number >= 1, got {}",
                self.exponential_base
            );
        }
        Ok(())
    }

    /// Delays before attempts `2..=max_attempts`, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (2..=self.attempts()).map(|k| self.delay_for(k)).collect()
    }
}
