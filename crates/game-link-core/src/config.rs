//! Runtime configuration

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for worker threads and request queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LinkConfig {
    /// Name given to the worker (owner) thread
    pub worker_name: String,

    /// Queue depth at which a receiver logs a backpressure warning.
    /// Queues are unbounded; this only affects logging. 0 disables it.
    pub queue_high_water: usize,

    /// Log a warning for every task discarded because its owner is gone
    pub log_discarded_tasks: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            worker_name: "game-link-worker".into(),
            queue_high_water: 4096,
            log_discarded_tasks: true,
        }
    }
}

impl LinkConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LinkError::Config(format!("Invalid config: {}", e)))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Check whether `depth` is exactly at the high-water mark
    pub fn is_high_water(&self, depth: usize) -> bool {
        self.queue_high_water != 0 && depth == self.queue_high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.worker_name, "game-link-worker");
        assert_eq!(config.queue_high_water, 4096);
        assert!(config.log_discarded_tasks);
    }

    #[test]
    fn test_partial_json() {
        let config = LinkConfig::from_json_str(r#"{"worker_name": "session"}"#).unwrap();
        assert_eq!(config.worker_name, "session");
        assert_eq!(config.queue_high_water, 4096);
    }

    #[test]
    fn test_invalid_json() {
        let err = LinkConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn test_high_water() {
        let config = LinkConfig {
            queue_high_water: 3,
            ..Default::default()
        };
        assert!(!config.is_high_water(2));
        assert!(config.is_high_water(3));
        assert!(!config.is_high_water(4));

        let disabled = LinkConfig {
            queue_high_water: 0,
            ..Default::default()
        };
        assert!(!disabled.is_high_water(0));
    }

    #[test]
    fn test_load_missing_file() {
        let err = LinkConfig::load("/nonexistent/game-link.json").unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }
}
