//! Configuration for the trust reconciler.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bound on a single keyring or validator command (30 seconds).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Smallest accepted command timeout.
pub const MIN_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A duration is below its minimum.
    #[error("{field} must be at least {min:?}, got {value:?}")]
    BelowMinimum {
        /// Offending field.
        field: &'static str,
        /// Minimum accepted value.
        min: Duration,
        /// Supplied value.
        value: Duration,
    },
}

/// Configuration for [`TrustReconciler`](crate::TrustReconciler).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use gitops_state_trust::TrustConfig;
///
/// let config = TrustConfig::builder().command_timeout(Duration::from_secs(10)).build()?;
/// assert_eq!(config.command_timeout(), Duration::from_secs(10));
///
/// let config: TrustConfig = serde_json::from_str(r#"{"command_timeout": "45s"}"#)?;
/// assert_eq!(config.command_timeout(), Duration::from_secs(45));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Bound on every external keyring or validator call.
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    command_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

#[bon::bon]
impl TrustConfig {
    /// Creates a configuration, validating every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `command_timeout` is shorter
    /// than [`MIN_COMMAND_TIMEOUT`].
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_COMMAND_TIMEOUT)] command_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { command_timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks field bounds. Call after deserializing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout < MIN_COMMAND_TIMEOUT {
            return Err(ConfigError::BelowMinimum {
                field: "command_timeout",
                min: MIN_COMMAND_TIMEOUT,
                value: self.command_timeout,
            });
        }
        Ok(())
    }

    /// Returns the external command timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self { command_timeout: DEFAULT_COMMAND_TIMEOUT }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrustConfig::builder().build().unwrap();
        assert_eq!(config, TrustConfig::default());
        assert_eq!(config.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_rejects_short_timeout() {
        let err =
            TrustConfig::builder().command_timeout(Duration::from_millis(10)).build().unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "command_timeout", .. }));
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        assert!(serde_json::from_str::<TrustConfig>(r#"{"timeout": "5s"}"#).is_err());
        let config: TrustConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
    }
}
