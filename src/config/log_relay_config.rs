//! Log relay configuration parsing.
//!
//! The relay listens on all interfaces by default and advertises itself under
//! the sandbox host name the platform uses to reach the extension.

use super::{parse_bool, parse_var};
use anyhow::{Result, bail};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Log relay listener configuration
#[derive(Debug, Clone)]
pub struct LogRelayEnvConfig {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    pub advertised_host: String,
    pub channel_capacity: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_payload_bytes: Option<usize>,
}

impl Default for LogRelayEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8125,
            advertised_host: "sandbox".to_string(),
            channel_capacity: 64,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            max_payload_bytes: None,
        }
    }
}

impl LogRelayEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let channel_capacity =
            parse_var(lookup, "LOG_RELAY_CHANNEL_CAPACITY", defaults.channel_capacity)?;
        if channel_capacity == 0 {
            bail!("LOG_RELAY_CHANNEL_CAPACITY must be at least 1");
        }

        let read_timeout_secs = parse_var(
            lookup,
            "LOG_RELAY_READ_TIMEOUT_SECS",
            defaults.read_timeout.as_secs(),
        )?;
        if read_timeout_secs == 0 {
            bail!("LOG_RELAY_READ_TIMEOUT_SECS must be at least 1");
        }

        let write_timeout_secs = parse_var(
            lookup,
            "LOG_RELAY_WRITE_TIMEOUT_SECS",
            defaults.write_timeout.as_secs(),
        )?;
        if write_timeout_secs == 0 {
            bail!("LOG_RELAY_WRITE_TIMEOUT_SECS must be at least 1");
        }

        let max_payload_bytes = match lookup("LOG_RELAY_MAX_PAYLOAD_BYTES") {
            Some(_) => Some(parse_var(lookup, "LOG_RELAY_MAX_PAYLOAD_BYTES", 0usize)?),
            None => None,
        };

        Ok(Self {
            enabled: parse_bool(lookup, "LOG_RELAY_ENABLED", defaults.enabled),
            bind_address: parse_var(lookup, "LOG_RELAY_BIND_ADDRESS", defaults.bind_address)?,
            port: parse_var(lookup, "LOG_RELAY_PORT", defaults.port)?,
            advertised_host: lookup("LOG_RELAY_ADVERTISED_HOST")
                .unwrap_or(defaults.advertised_host),
            channel_capacity,
            read_timeout: Duration::from_secs(read_timeout_secs),
            write_timeout: Duration::from_secs(write_timeout_secs),
            max_payload_bytes,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
