//! Processor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::RetryConfig;
use crate::errors::StagegateError;

/// Configuration for [`AtomicPipelineProcessor`](super::AtomicPipelineProcessor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// How long `process` waits for the pipeline lease, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Retry policy for generation conflicts.
    pub conflict_retry: RetryConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            conflict_retry: RetryConfig::default(),
        }
    }
}

impl ProcessorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::Config`] if the document is malformed or
    /// fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, StagegateError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| StagegateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the lease wait timeout.
    #[must_use]
    pub const fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    /// Sets the conflict retry policy.
    #[must_use]
    pub fn with_conflict_retry(mut self, retry: RetryConfig) -> Self {
        self.conflict_retry = retry;
        self
    }

    /// The lease wait timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Checks the configuration for values the processor cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), StagegateError> {
        let retry = &self.conflict_retry;
        if retry.max_attempts == 0 {
            return Err(StagegateError::Config(
                "conflict_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(StagegateError::Config(format!(
                "conflict_retry.base_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        Ok(())
    }
}
