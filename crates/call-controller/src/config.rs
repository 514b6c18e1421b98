//! Call Controller configuration.
//!
//! Configuration is loaded from environment variables with typed defaults.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default ring deadline in seconds: how long an invitation stays pending.
pub const DEFAULT_RING_TIMEOUT_SECONDS: u64 = 30;

/// Default post-accept inactivity timeout in seconds: a call that was
/// accepted but saw no relay activity before reaching `active` is ended.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 60;

/// Default coordinator sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5;

/// Default retention window for ended calls in seconds. Within this
/// window late operations observe the terminal state (idempotent end,
/// `InvitationExpired` on late accept); afterwards they get `CallNotFound`.
pub const DEFAULT_ENDED_RETENTION_SECONDS: u64 = 60;

/// Default maximum concurrent non-terminal calls.
pub const DEFAULT_MAX_CALLS: u32 = 1000;

/// Default coordinator instance ID prefix.
pub const DEFAULT_CC_ID_PREFIX: &str = "cc";

/// Call Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Ring deadline in seconds (default: 30).
    pub ring_timeout_seconds: u64,

    /// Post-accept inactivity timeout in seconds (default: 60).
    pub connect_timeout_seconds: u64,

    /// Coordinator sweep interval in seconds (default: 5).
    pub sweep_interval_seconds: u64,

    /// Ended-call retention window in seconds (default: 60).
    pub ended_retention_seconds: u64,

    /// Maximum concurrent non-terminal calls (default: 1000).
    pub max_calls: u32,

    /// Unique identifier for this coordinator instance.
    pub cc_id: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a provided value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if a provided value fails validation.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let health_bind_address = vars
            .get("CC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let ring_timeout_seconds = parse_or_default(
            vars,
            "CC_RING_TIMEOUT_SECONDS",
            DEFAULT_RING_TIMEOUT_SECONDS,
        )?;

        let connect_timeout_seconds = parse_or_default(
            vars,
            "CC_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?;

        let sweep_interval_seconds = parse_or_default(
            vars,
            "CC_SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?;

        let ended_retention_seconds = parse_or_default(
            vars,
            "CC_ENDED_RETENTION_SECONDS",
            DEFAULT_ENDED_RETENTION_SECONDS,
        )?;

        let max_calls = parse_or_default(vars, "CC_MAX_CALLS", DEFAULT_MAX_CALLS)?;

        if ring_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "CC_RING_TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }
        if sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "CC_SWEEP_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        // Generate coordinator instance ID
        let cc_id = vars.get("CC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_CC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            health_bind_address,
            ring_timeout_seconds,
            connect_timeout_seconds,
            sweep_interval_seconds,
            ended_retention_seconds,
            max_calls,
            cc_id,
        })
    }
}

fn parse_or_default<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.ring_timeout_seconds, DEFAULT_RING_TIMEOUT_SECONDS);
        assert_eq!(
            config.connect_timeout_seconds,
            DEFAULT_CONNECT_TIMEOUT_SECONDS
        );
        assert_eq!(config.sweep_interval_seconds, DEFAULT_SWEEP_INTERVAL_SECONDS);
        assert_eq!(
            config.ended_retention_seconds,
            DEFAULT_ENDED_RETENTION_SECONDS
        );
        assert_eq!(config.max_calls, DEFAULT_MAX_CALLS);
        // Coordinator ID should be auto-generated
        assert!(config.cc_id.starts_with("cc-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "CC_HEALTH_BIND_ADDRESS".to_string(),
                "127.0.0.1:8082".to_string(),
            ),
            ("CC_RING_TIMEOUT_SECONDS".to_string(), "15".to_string()),
            ("CC_CONNECT_TIMEOUT_SECONDS".to_string(), "90".to_string()),
            ("CC_SWEEP_INTERVAL_SECONDS".to_string(), "2".to_string()),
            ("CC_ENDED_RETENTION_SECONDS".to_string(), "120".to_string()),
            ("CC_MAX_CALLS".to_string(), "500".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");

        assert_eq!(config.health_bind_address, "127.0.0.1:8082");
        assert_eq!(config.ring_timeout_seconds, 15);
        assert_eq!(config.connect_timeout_seconds, 90);
        assert_eq!(config.sweep_interval_seconds, 2);
        assert_eq!(config.ended_retention_seconds, 120);
        assert_eq!(config.max_calls, 500);
    }

    #[test]
    fn test_cc_id_custom_value() {
        let vars = HashMap::from([("CC_ID".to_string(), "cc-custom-001".to_string())]);
        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.cc_id, "cc-custom-001");
    }

    #[test]
    fn test_invalid_numeric_value_rejected() {
        let vars = HashMap::from([("CC_MAX_CALLS".to_string(), "plenty".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_ring_timeout_rejected() {
        let vars = HashMap::from([("CC_RING_TIMEOUT_SECONDS".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
