//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("debounce interval must be greater than zero")]
  ZeroDebounceInterval,
  #[error("debounce concurrency limit must be greater than zero (use None for unlimited)")]
  ZeroDebounceConcurrency,
}

/// Tuning for the per-search update pipeline.
///
/// One debouncer is built from these values for every search, so changing
/// the config only affects searches started afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
  /// Minimum interval between persisted/broadcast progress updates driven
  /// by the response stream, in milliseconds.
  pub debounce_ms: u64,

  /// How many debounced updates may run at once. `None` removes the gate
  /// entirely. A staged update whose tick finds no free slot waits for the
  /// next tick.
  pub debounce_concurrency: Option<usize>,

  /// Capacity of the per-search engine event channel. The engine observes
  /// backpressure once this many events are buffered.
  pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      debounce_ms: 250,
      debounce_concurrency: Some(1),
      event_buffer: 256,
    }
  }
}

impl OrchestratorConfig {
  /// A zero interval or a zero concurrency limit is a configuration error,
  /// rejected up front rather than reinterpreted.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.debounce_ms == 0 {
      return Err(ConfigError::ZeroDebounceInterval);
    }
    if self.debounce_concurrency == Some(0) {
      return Err(ConfigError::ZeroDebounceConcurrency);
    }
    Ok(())
  }

  pub fn debounce_interval(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}
