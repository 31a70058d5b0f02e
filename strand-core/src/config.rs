//! Runtime configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config:
//!
//! ```rust
//! use strand_core::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "sweep_delay_ms": 250 }"#).unwrap();
//! assert_eq!(config.sweep_delay_ms, 250);
//! assert_eq!(config.flush_delay_ms, 0);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Delay before a scheduled flush runs. Zero means "next tick".
    pub flush_delay_ms: u64,

    /// Delay of the liveness sweep scheduled for every new subscription.
    pub sweep_delay_ms: u64,

    /// Rounds one flush may run before the rest of the batch is deferred to
    /// the next tick.
    pub max_flush_rounds: usize,
}

impl RuntimeConfig {
    /// Parse and validate a config from JSON.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_rounds == 0 {
            return Err(ConfigError::Invalid("max_flush_rounds must be at least 1"));
        }
        Ok(())
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn sweep_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_delay_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: 0,
            sweep_delay_ms: 1000,
            max_flush_rounds: 100,
        }
    }
}
