//! Observability configuration parsing from environment variables.
//!
//! This module handles loading the background metrics reporter settings.

use super::{parse_bool, parse_var};
use anyhow::Result;
use std::time::Duration;

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval_secs = parse_var(lookup, "OBSERVABILITY_INTERVAL", 60u64)?;
        Ok(Self {
            enabled: parse_bool(lookup, "OBSERVABILITY_ENABLED", true),
            interval: Duration::from_secs(interval_secs.max(1)),
        })
    }
}
