//! Configuration module for the daemon.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Control surface, Log relay, and Observability.
//! Every loader also accepts an arbitrary key lookup so callers can parse from
//! something other than the process environment.

mod control_config;
mod log_relay_config;
mod observability_config;

pub use control_config::ControlEnvConfig;
pub use log_relay_config::LogRelayEnvConfig;
pub use observability_config::ObservabilityEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Main daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub control: ControlEnvConfig,
    pub log_relay: LogRelayEnvConfig,
    pub observability: ObservabilityEnvConfig,

    // Lifecycle
    pub shutdown_grace: Duration,
    pub metrics_init_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: ControlEnvConfig::default(),
            log_relay: LogRelayEnvConfig::default(),
            observability: ObservabilityEnvConfig::default(),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            metrics_init_delay: Duration::ZERO,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// This orchestrates loading from all sub-config modules and composes
    /// them into a unified Config struct.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let control =
            ControlEnvConfig::from_lookup(&lookup).context("Failed to load control config")?;
        let log_relay =
            LogRelayEnvConfig::from_lookup(&lookup).context("Failed to load log relay config")?;
        let observability = ObservabilityEnvConfig::from_lookup(&lookup)
            .context("Failed to load observability config")?;

        let shutdown_grace_secs =
            parse_var(&lookup, "SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?;
        let metrics_init_delay_ms = parse_var(&lookup, "METRICS_INIT_DELAY_MS", 0u64)?;

        Ok(Self {
            control,
            log_relay,
            observability,
            shutdown_grace: Duration::from_secs(shutdown_grace_secs),
            metrics_init_delay: Duration::from_millis(metrics_init_delay_ms),
        })
    }
}

/// Parse `key` with `FromStr`, falling back to `default` when unset.
/// A set-but-invalid value is an error.
pub(crate) fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Booleans never fail: anything unparsable means `default`.
pub(crate) fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|raw| raw.trim().to_lowercase().parse::<bool>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(|_| None).expect("Should parse with defaults");
        assert_eq!(config.control.port, 8124);
        assert_eq!(config.log_relay.channel_capacity, 64);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.metrics_init_delay, Duration::ZERO);
    }

    #[test]
    fn test_lifecycle_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("SHUTDOWN_GRACE_SECS", "1"),
            ("METRICS_INIT_DELAY_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
        assert_eq!(config.metrics_init_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = Config::from_lookup(lookup_from(&[("SHUTDOWN_GRACE_SECS", "soon")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("SHUTDOWN_GRACE_SECS"));
    }

    #[test]
    fn test_parse_bool_falls_back() {
        let lookup = lookup_from(&[("A", "TRUE"), ("B", "nope")]);
        assert!(parse_bool(&lookup, "A", false));
        assert!(parse_bool(&lookup, "B", true));
        assert!(!parse_bool(&lookup, "C", false));
    }
}
