//! Client configuration types
//!
//! Defines the configuration structures for the Ratline relay client.

use serde::{Deserialize, Serialize};

/// Default backend connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Default TCP_NODELAY setting
fn default_nodelay() -> bool {
    true
}

/// Default TCP keepalive timeout in seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default TCP keepalive interval in seconds
fn default_keepalive_interval() -> u64 {
    8
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Client configuration
    pub client: ClientConfig,
}

/// Client configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Tunnel server address (e.g., "server.example.com:7000")
    pub remote_addr: String,

    /// Relay engine configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// TCP socket options for tunnel and backend connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.remote_addr.is_empty() {
            return Err("remote_addr must not be empty".to_string());
        }
        if !self.remote_addr.contains(':') {
            return Err(format!(
                "remote_addr '{}' is missing a port",
                self.remote_addr
            ));
        }
        Ok(())
    }
}

/// Relay engine configuration
///
/// Carries the settings the reference design kept in process-wide
/// singletons; they are turned into an immutable
/// [`RelayContext`](crate::relay::RelayContext) at startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Multiplex logical streams over one shared tunnel connection
    #[serde(default)]
    pub tcp_mux: bool,

    /// Speak the legacy direct-connect variant (no SOCKS5 negotiation),
    /// for compatibility with older peers
    #[serde(default)]
    pub legacy_handshake: bool,

    /// Backend connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            tcp_mux: false,
            legacy_handshake: false,
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// TCP socket options
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert!(!config.tcp_mux);
        assert!(!config.legacy_handshake);
        assert_eq!(config.connect_timeout, 10);
    }

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert!(config.nodelay);
        assert_eq!(config.keepalive_secs, 20);
        assert_eq!(config.keepalive_interval, 8);
    }

    #[test]
    fn test_client_config_validate() {
        let config = ClientConfig {
            remote_addr: "server.example.com:7000".to_string(),
            relay: RelayConfig::default(),
            tcp: TcpConfig::default(),
        };
        assert!(config.validate().is_ok());

        let config = ClientConfig {
            remote_addr: String::new(),
            relay: RelayConfig::default(),
            tcp: TcpConfig::default(),
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            remote_addr: "no-port".to_string(),
            relay: RelayConfig::default(),
            tcp: TcpConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
