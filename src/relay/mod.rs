//! Relay engine
//!
//! The core of Ratline: the SOCKS5 address codec, the incremental protocol
//! state machine, the backend connector, and the forwarding bridge that
//! pumps payload in both directions once a stream is established.
//!
//! The engine is driven by whoever owns the tunnel connection: stage
//! inbound bytes in a [`RingBuffer`], call
//! [`ProxyClient::on_tunnel_data`] per arrival, and route backend bytes
//! back through [`ProxyClient::forward_server_to_client`].

pub mod addr;
mod bridge;
pub mod connector;
pub mod consts;
mod proxy;
mod ring;

pub use addr::SocksAddr;
pub use connector::{BoxedStream, Connector, SocketOpts, StreamDyn, TcpConnector};
pub use proxy::{HandshakeMode, ProxyClient, ProxyState};
pub use ring::RingBuffer;

use crate::config::RelayConfig;
use std::time::Duration;

/// Immutable relay context shared by every component of one tunnel
///
/// Replaces the reference design's process-wide configuration singletons:
/// constructed once from the loaded configuration and passed by value into
/// the connector and the forwarding bridge.
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// Whether streams are multiplexed over one shared tunnel connection
    pub tcp_mux: bool,
    /// Timeout applied to backend connect attempts
    pub connect_timeout: Duration,
}

impl Default for RelayContext {
    fn default() -> Self {
        RelayContext {
            tcp_mux: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&RelayConfig> for RelayContext {
    fn from(config: &RelayConfig) -> Self {
        RelayContext {
            tcp_mux: config.tcp_mux,
            connect_timeout: Duration::from_secs(config.connect_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_default() {
        let ctx = RelayContext::default();
        assert!(!ctx.tcp_mux);
        assert_eq!(ctx.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_context_from_config() {
        let config = RelayConfig {
            tcp_mux: true,
            legacy_handshake: false,
            connect_timeout: 3,
        };
        let ctx = RelayContext::from(&config);
        assert!(ctx.tcp_mux);
        assert_eq!(ctx.connect_timeout, Duration::from_secs(3));
    }
}
