//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Retry budget copied onto each new execution.
  pub max_retries: u32,
  /// Base backoff delay before the first retry.
  pub retry_delay_ms: u64,
  /// Growth factor applied per retry attempt.
  pub retry_backoff_multiplier: f64,
  /// Step timeout used when a step's definition carries none.
  pub timeout_minutes: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      retry_delay_ms: 1000,
      retry_backoff_multiplier: 2.0,
      timeout_minutes: 60,
    }
  }
}

impl EngineConfig {
  /// Backoff before retrying a step that has already been retried
  /// `attempt` times: `retry_delay_ms * retry_backoff_multiplier ^ attempt`.
  pub fn retry_delay(&self, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let ms = self.retry_delay_ms as f64 * self.retry_backoff_multiplier.powi(exponent);
    Duration::from_millis(ms.round() as u64)
  }

  /// Default step timeout.
  pub fn step_timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_minutes.saturating_mul(60))
  }

  pub(crate) fn execution_max_retries(&self) -> i32 {
    i32::try_from(self.max_retries).unwrap_or(i32::MAX)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backoff_doubles_per_attempt() {
    let config = EngineConfig::default();
    assert_eq!(config.retry_delay(0), Duration::from_millis(1000));
    assert_eq!(config.retry_delay(1), Duration::from_millis(2000));
    assert_eq!(config.retry_delay(2), Duration::from_millis(4000));
  }

  #[test]
  fn test_backoff_custom_multiplier() {
    let config = EngineConfig {
      retry_delay_ms: 250,
      retry_backoff_multiplier: 1.5,
      ..Default::default()
    };
    assert_eq!(config.retry_delay(0), Duration::from_millis(250));
    assert_eq!(config.retry_delay(2), Duration::from_millis(563));
  }

  #[test]
  fn test_step_timeout() {
    assert_eq!(
      EngineConfig::default().step_timeout(),
      Duration::from_secs(3600)
    );
    let huge = EngineConfig {
      timeout_minutes: u64::MAX,
      ..Default::default()
    };
    assert_eq!(huge.step_timeout(), Duration::from_secs(u64::MAX));
  }

  #[test]
  fn test_partial_config_uses_defaults() {
    let config: EngineConfig = serde_json::from_str(r#"{ "max_retries": 5 }"#).unwrap();
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_delay_ms, 1000);
    assert_eq!(config.retry_backoff_multiplier, 2.0);
  }
}
