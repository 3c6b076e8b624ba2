//! # Provider Configuration
//!
//! [`ProviderConfig`] holds one [`PollPolicy`] per operation class. It is built once by
//! the caller and passed explicitly to the components that need it; nothing here is
//! process-wide.
//!
//! ```toml
//! [create]
//! initial_delay_ms = 1000
//! interval_ms = 5000
//! timeout_secs = 1200
//!
//! [order]
//! interval_ms = 30000
//! timeout_secs = 3600
//! ```
//!
//! Missing tables fall back to [`ProviderConfig::default`]; missing keys inside a
//! table fall back to [`PollPolicy::default`].

use crate::error::ProviderError;
use crate::poller::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub create: PollPolicy,
    pub update: PollPolicy,
    pub delete: PollPolicy,
    /// Delivery of billable orders; typically much slower than plain operations.
    pub order: PollPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            create: PollPolicy::default(),
            update: PollPolicy::default(),
            delete: PollPolicy::new(
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(10 * 60),
            ),
            order: PollPolicy::new(
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(60 * 60),
            ),
        }
    }
}

impl ProviderConfig {
    /// Same policy for every operation class.
    pub fn uniform(policy: PollPolicy) -> Self {
        Self {
            create: policy,
            update: policy,
            delete: policy,
            order: policy,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ProviderError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ProviderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        for (name, policy) in [
            ("create", &self.create),
            ("update", &self.update),
            ("delete", &self.delete),
            ("order", &self.order),
        ] {
            policy
                .validate()
                .map_err(|source| ProviderError::Policy { class: name, source })?;
        }
        Ok(())
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Duration` as integer seconds.
pub(crate) mod serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;

    #[test]
    fn test_config_default_is_valid() {
        let config = ProviderConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.order.timeout > config.create.timeout);
    }

    #[test]
    fn test_config_parse_toml() {
        let toml = r#"
[create]
initial_delay_ms = 250
interval_ms = 2000
timeout_secs = 300

[order]
timeout_secs = 7200
"#;
        let config = ProviderConfig::from_toml_str(toml).unwrap();

        assert_eq!(config.create.initial_delay, Duration::from_millis(250));
        assert_eq!(config.create.interval, Duration::from_secs(2));
        assert_eq!(config.create.timeout, Duration::from_secs(300));
        // Unspecified keys keep their defaults.
        assert_eq!(config.order.interval, PollPolicy::default().interval);
        assert_eq!(config.order.timeout, Duration::from_secs(7200));
        assert_eq!(config.update, ProviderConfig::default().update);
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let err = ProviderConfig::from_toml_str("[delete]\ninterval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("[delete]"), "{err}");
    }

    #[test]
    fn test_config_rejects_out_of_range_timeout() {
        let err = ProviderConfig::from_toml_str("[create]\ntimeout_secs = 9223372036854775807\n")
            .unwrap_err();
        assert!(
            matches!(
                err,
                ProviderError::Policy {
                    class: "create",
                    source: PolicyError::TooLong { field: "timeout", .. }
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn test_config_rejects_unknown_policy_key() {
        let err = ProviderConfig::from_toml_str("[order]\ninterval = 5000\n").unwrap_err();
        assert!(err.to_string().contains("interval"), "{err}");
    }

    #[test]
    fn test_config_rejects_unknown_table() {
        assert!(ProviderConfig::from_toml_str("[creat]\ninterval_ms = 10\n").is_err());
    }
}
