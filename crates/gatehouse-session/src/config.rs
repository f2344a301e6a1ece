//! Registry configuration.

use crate::policy::DEFAULT_MAX_CONNECTIONS_PER_ADDRESS;
use crate::{AdmissionPolicy, SessionError};

/// Environment variable holding the per-address connection limit.
pub const MAX_CONNECTIONS_ENV: &str = "GATEHOUSE_MAX_CONNECTIONS_PER_ADDRESS";

/// Tunables for a [`SessionRegistry`](crate::SessionRegistry).
///
/// Read once at startup; the registry copies what it needs and never
/// looks at the environment again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum concurrent sessions (pending + active) from one source
    /// address. Default: 10. `0` refuses every connection.
    pub max_connections_per_address: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections_per_address: DEFAULT_MAX_CONNECTIONS_PER_ADDRESS,
        }
    }
}

impl RegistryConfig {
    /// Reads [`MAX_CONNECTIONS_ENV`] from the process environment.
    ///
    /// A missing or unparseable value falls back to the default; the
    /// latter is logged.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match Self::try_from_lookup(lookup) {
            Ok(config) => config,
            Err(e) => {
                let config = Self::default();
                tracing::warn!(
                    error = %e,
                    max_connections_per_address = config.max_connections_per_address,
                    "ignoring invalid registry config, using default"
                );
                config
            }
        }
    }

    /// Strict variant of [`from_lookup`](Self::from_lookup).
    ///
    /// # Errors
    /// [`SessionError::InvalidConfig`] if the value is present but is not
    /// a non-negative integer.
    pub fn try_from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SessionError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_CONNECTIONS_ENV) {
            config.max_connections_per_address =
                raw.trim().parse().map_err(|_| SessionError::InvalidConfig {
                    key: MAX_CONNECTIONS_ENV,
                    value: raw.clone(),
                })?;
        }
        Ok(config)
    }

    pub fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(self.max_connections_per_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_with(value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |key| (key == MAX_CONNECTIONS_ENV).then(|| value.to_string())
    }

    #[test]
    fn test_from_lookup_missing_uses_default() {
        let config = RegistryConfig::from_lookup(|_| None);
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.max_connections_per_address, 10);
    }

    #[test]
    fn test_from_lookup_reads_value() {
        let config = RegistryConfig::from_lookup(lookup_with("25"));
        assert_eq!(config.max_connections_per_address, 25);
    }

    #[test]
    fn test_from_lookup_trims_whitespace() {
        let config = RegistryConfig::from_lookup(lookup_with(" 3\n"));
        assert_eq!(config.max_connections_per_address, 3);
    }

    #[test]
    fn test_from_lookup_garbage_falls_back_to_default() {
        let config = RegistryConfig::from_lookup(lookup_with("lots"));
        assert_eq!(config.max_connections_per_address, 10);
    }

    #[test]
    fn test_try_from_lookup_negative_returns_invalid_config() {
        let result = RegistryConfig::try_from_lookup(lookup_with("-1"));
        assert!(
            matches!(
                result,
                Err(SessionError::InvalidConfig { key, ref value })
                    if key == MAX_CONNECTIONS_ENV && value == "-1"
            ),
            "got {result:?}"
        );
    }

    #[test]
    fn test_policy_matches_config() {
        let config = RegistryConfig {
            max_connections_per_address: 2,
        };
        assert_eq!(config.policy(), AdmissionPolicy::new(2));
    }
}
