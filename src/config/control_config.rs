//! Control surface configuration parsing.

use super::parse_var;
use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Control listener configuration
#[derive(Debug, Clone)]
pub struct ControlEnvConfig {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for ControlEnvConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8124,
        }
    }
}

impl ControlEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_address: parse_var(lookup, "CONTROL_BIND_ADDRESS", defaults.bind_address)?,
            port: parse_var(lookup, "CONTROL_PORT", defaults.port)?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_config_defaults() {
        let config = ControlEnvConfig::from_lookup(&|_: &str| None).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8124");
    }

    #[test]
    fn test_control_config_rejects_bad_address() {
        let lookup = |key: &str| (key == "CONTROL_BIND_ADDRESS").then(|| "localhost!".to_string());
        assert!(ControlEnvConfig::from_lookup(&lookup).is_err());
    }
}
