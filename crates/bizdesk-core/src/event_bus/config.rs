//! Event bus configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EventBusError;

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Longest time the dispatch loop sleeps without a wake-up, in milliseconds.
    pub tick_interval_ms: u64,
    /// Maximum events drained per dispatch pass.
    pub batch_size: usize,
    /// Threads in the async callback pool.
    pub worker_threads: usize,
    /// Maximum number of events to retain in history (0 disables history).
    pub history_capacity: usize,
    /// Buffer size of the notification broadcast channel.
    pub notification_capacity: usize,
    /// How long shutdown waits for in-flight callbacks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            batch_size: 10,
            worker_threads: 4,
            history_capacity: 10_000,
            notification_capacity: 1024,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl EventBusConfig {
    /// Dispatch loop tick interval
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Shutdown grace period
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), EventBusError> {
        if self.tick_interval_ms == 0 {
            return Err(EventBusError::InvalidConfig(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EventBusError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(EventBusError::InvalidConfig(
                "worker_threads must be > 0".to_string(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(EventBusError::InvalidConfig(
                "notification_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EventBusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.history_capacity, 10_000);
    }

    #[test]
    fn test_invalid_config() {
        let config = EventBusConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EventBusError::InvalidConfig(msg)) if msg.contains("batch_size")
        ));

        let config = EventBusConfig {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EventBusConfig =
            serde_json::from_str(r#"{"batch_size": 25}"#).expect("Should deserialize");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.worker_threads, 4);
    }
}
