//! Environment-based configuration.
//!
//! Variables are read as `<PREFIX>_<NAME>`; the default prefix is `NETSSH`.
//! Overrides registered with [`EnvConfig::with_override`] shadow the process
//! environment, which keeps tests from mutating global state.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "NETSSH";

/// Variable names understood by [`crate::profile::PlatformProfile::from_env`].
pub mod vars {
    /// Platform name (`iosxr`, `iosxe`, `nxos`, `linux`).
    pub const PLATFORM: &str = "PLATFORM";
    /// Inactivity timeout in seconds.
    pub const TIMEOUT_SECS: &str = "TIMEOUT_SECS";
    /// First-byte timeout in seconds.
    pub const FIRST_BYTE_TIMEOUT_SECS: &str = "FIRST_BYTE_TIMEOUT_SECS";
    /// Settle delay in milliseconds.
    pub const SETTLE_MS: &str = "SETTLE_MS";
    /// Output directory.
    pub const OUTPUT_DIR: &str = "OUTPUT_DIR";
    /// Log filter directive, read by [`crate::logging::LogConfig::from_env`].
    pub const LOG: &str = "LOG";
    /// Log format (`text` or `json`).
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Environment variable reader.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Values that shadow the process environment.
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Shadow `name` with a fixed value.
    #[must_use]
    pub fn with_override(mut self, name: &str, value: impl Into<String>) -> Self {
        let var_name = self.var_name(name);
        self.overrides.insert(var_name, value.into());
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        self.overrides
            .get(&var_name)
            .cloned()
            .or_else(|| std::env::var(&var_name).ok())
            .filter(|v| !v.trim().is_empty())
    }

    /// Get a parsed value. Unparsable values are ignored with a warning.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.get(name)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(var = %self.var_name(name), value = %raw, "Ignoring unparsable value");
                None
            }
        }
    }

    /// Get a duration in seconds.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_secs)
    }

    /// Get a duration in milliseconds.
    #[must_use]
    pub fn duration_millis(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_millis)
    }

    /// Check if a variable is set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Platform, PlatformProfile};

    #[test]
    fn env_config_prefix() {
        let config = EnvConfig::new("TEST");
        assert_eq!(config.var_name("foo"), "TEST_FOO");
        assert_eq!(config.var_name("bar_baz"), "TEST_BAR_BAZ");
        assert_eq!(EnvConfig::new("").var_name("foo"), "FOO");
    }

    #[test]
    fn overrides_shadow_environment() {
        let config = EnvConfig::new("NETSSH_UNIT")
            .with_override(vars::TIMEOUT_SECS, "7")
            .with_override(vars::SETTLE_MS, "250")
            .with_override(vars::OUTPUT_DIR, "  ");

        assert_eq!(config.duration_secs(vars::TIMEOUT_SECS), Some(Duration::from_secs(7)));
        assert_eq!(config.duration_millis(vars::SETTLE_MS), Some(Duration::from_millis(250)));
        assert!(!config.is_set(vars::OUTPUT_DIR));
    }

    #[test]
    fn bad_numbers_are_ignored() {
        let config = EnvConfig::new("NETSSH_UNIT").with_override(vars::TIMEOUT_SECS, "ten");
        assert_eq!(config.duration_secs(vars::TIMEOUT_SECS), None);
    }

    #[test]
    fn profile_from_env() {
        let config = EnvConfig::new("NETSSH_UNIT")
            .with_override(vars::PLATFORM, "nxos")
            .with_override(vars::FIRST_BYTE_TIMEOUT_SECS, "30")
            .with_override(vars::OUTPUT_DIR, "/var/tmp/captures");

        let profile = PlatformProfile::from_env(&config).expect("profile");
        assert_eq!(profile.platform, Platform::CiscoNxos);
        assert_eq!(profile.execute.first_byte_timeout, Duration::from_secs(30));
        assert_eq!(profile.execute.timeout, Duration::from_secs(10));
        assert_eq!(profile.output_dir, std::path::PathBuf::from("/var/tmp/captures"));
    }

    #[test]
    fn unknown_platform_in_env() {
        let config = EnvConfig::new("NETSSH_UNIT").with_override(vars::PLATFORM, "vms");
        assert!(PlatformProfile::from_env(&config).is_err());
    }
}
