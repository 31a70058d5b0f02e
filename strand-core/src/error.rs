//! Error types.
//!
//! Effect failures never reach the caller of `track` or `Runtime::flush`.
//! They are turned into an [`EffectError`] at the tracking boundary and
//! logged there. Only configuration loading returns errors to the caller.

use thiserror::Error;

/// A failed effect run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// The effect body panicked. Holds the panic message when it was a string.
    #[error("effect panicked: {0}")]
    Panicked(String),

    /// The effect body returned an error.
    #[error("effect failed: {0}")]
    Failed(String),
}

/// Errors from loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input was not valid JSON for the config shape.
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The input parsed but a field is out of range.
    #[error("invalid runtime config: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_error_messages() {
        let err = EffectError::Panicked("boom".into());
        assert_eq!(err.to_string(), "effect panicked: boom");

        let err = EffectError::Failed("no such node".into());
        assert_eq!(err.to_string(), "effect failed: no such node");
    }

    #[test]
    fn config_error_wraps_json_error() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = ConfigError::from(json_err);
        assert!(err.to_string().starts_with("invalid runtime config:"));
    }
}
