//! Configuration for the repository registry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Default bound on a single connectivity probe (60 seconds).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Smallest accepted probe timeout.
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Revision used by application discovery when the caller names none.
pub const DEFAULT_REVISION: &str = "HEAD";

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    /// Offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

/// Configuration for [`RepositoryRegistry`](crate::RepositoryRegistry).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use gitops_state_registry::RegistryConfig;
///
/// let config = RegistryConfig::builder()
///     .cache_capacity(500)
///     .probe_timeout(Duration::from_secs(15))
///     .build()?;
/// assert_eq!(config.default_revision(), "HEAD");
///
/// assert!(RegistryConfig::builder().cache_capacity(0).build().is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Maximum number of URLs held by the in-memory connection-state cache.
    #[serde(default = "default_cache_capacity")]
    cache_capacity: u64,

    /// Bound on a single connectivity probe.
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    probe_timeout: Duration,

    /// Revision used by application discovery when none is given.
    #[serde(default = "default_revision")]
    default_revision: String,
}

fn default_cache_capacity() -> u64 {
    DEFAULT_CACHE_CAPACITY
}

fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

fn default_revision() -> String {
    DEFAULT_REVISION.to_owned()
}

#[bon::bon]
impl RegistryConfig {
    /// Creates a configuration, validating every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `cache_capacity` is zero, `probe_timeout` is
    /// below [`MIN_PROBE_TIMEOUT`], or `default_revision` is empty.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_CACHE_CAPACITY)] cache_capacity: u64,
        #[builder(default = DEFAULT_PROBE_TIMEOUT)] probe_timeout: Duration,
        #[builder(into, default = DEFAULT_REVISION.to_owned())] default_revision: String,
    ) -> Result<Self, ConfigError> {
        let config = Self { cache_capacity, probe_timeout, default_revision };
        config.validate()?;
        Ok(config)
    }

    /// Checks field bounds. Call after deserializing.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError {
                field: "cache_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.probe_timeout < MIN_PROBE_TIMEOUT {
            return Err(ConfigError {
                field: "probe_timeout",
                reason: format!(
                    "must be at least {MIN_PROBE_TIMEOUT:?}, got {:?}",
                    self.probe_timeout
                ),
            });
        }
        if self.default_revision.trim().is_empty() {
            return Err(ConfigError {
                field: "default_revision",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Returns the in-memory cache capacity.
    #[must_use]
    pub fn cache_capacity(&self) -> u64 {
        self.cache_capacity
    }

    /// Returns the probe timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Returns the default revision for application discovery.
    #[must_use]
    pub fn default_revision(&self) -> &str {
        &self.default_revision
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            default_revision: default_revision(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        assert_eq!(RegistryConfig::builder().build().unwrap(), RegistryConfig::default());
    }

    #[rstest]
    #[case::zero_capacity(RegistryConfig::builder().cache_capacity(0).build(), "cache_capacity")]
    #[case::short_timeout(
        RegistryConfig::builder().probe_timeout(Duration::from_millis(1)).build(),
        "probe_timeout"
    )]
    #[case::empty_revision(
        RegistryConfig::builder().default_revision(" ").build(),
        "default_revision"
    )]
    fn test_invalid_fields(
        #[case] result: Result<RegistryConfig, ConfigError>,
        #[case] field: &str,
    ) {
        assert_eq!(result.unwrap_err().field, field);
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"probe_timeout": "2m", "default_revision": "main"}"#).unwrap();
        assert_eq!(config.probe_timeout(), Duration::from_secs(120));
        assert_eq!(config.default_revision(), "main");
        assert_eq!(config.cache_capacity(), DEFAULT_CACHE_CAPACITY);
        config.validate().unwrap();

        assert!(serde_json::from_str::<RegistryConfig>(r#"{"ttl": "1m"}"#).is_err());
    }
}
