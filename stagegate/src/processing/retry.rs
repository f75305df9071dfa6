//! Retry policy for cycles rejected by the generation check.
//!
//! Provides exponential, linear or constant backoff with jitter so that
//! writers contending on one pipeline spread out instead of colliding again.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the wait between conflicting cycles grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Doubles after every rejected commit.
    #[default]
    Exponential,
    /// Grows by `base_delay_ms` after every rejected commit.
    Linear,
    /// Always waits `base_delay_ms`.
    Constant,
}

/// Randomization applied to the wait so that writers racing on one
/// pipeline do not retry in step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Wait exactly the backoff delay.
    None,
    /// Anywhere between zero and the backoff delay.
    #[default]
    Full,
    /// At least half the backoff delay.
    Equal,
    /// Between the base delay and three times the previous wait.
    Decorrelated,
}

/// Retry policy for cycles whose commit lost the generation race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum cycles per call, including the first.
    pub max_attempts: usize,
    /// Wait after the first conflict, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single wait, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth of the wait across conflicts.
    pub backoff_strategy: BackoffStrategy,
    /// Randomization of each wait.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 500,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates the default conflict policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many cycles one call may run.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the wait after the first conflict.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Caps every wait.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets how the wait grows.
    #[must_use]
    pub const fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets how the wait is randomized.
    #[must_use]
    pub const fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// What to do after a rejected commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reload and rerun the cycle after waiting.
    Retry(Duration),
    /// Budget spent; surface a processing conflict.
    GiveUp,
}

/// Retry bookkeeping for one `process` call.
#[derive(Debug, Default)]
pub struct RetryState {
    failures: usize,
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Starts with no rejected commits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rejected attempts so far.
    #[must_use]
    pub const fn failures(&self) -> usize {
        self.failures
    }

    /// Records a rejected attempt and decides whether to try again.
    pub fn record_failure(&mut self, config: &RetryConfig) -> RetryDecision {
        self.failures += 1;
        if self.failures >= config.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.calculate_delay(config))
    }

    /// Computes the wait before rerunning the cycle.
    #[must_use]
    pub fn calculate_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        // Zero-based index of the retry about to happen.
        let retry = self.failures.saturating_sub(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
            BackoffStrategy::Linear => {
                let factor = u64::try_from(retry + 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor).min(max)
            }
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base.min(max)
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }
}
