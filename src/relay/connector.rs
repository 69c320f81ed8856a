//! Backend connector
//!
//! Opens the outbound connection to the real destination named by a decoded
//! [`SocksAddr`]. The [`Connector`] trait is the seam the state machine
//! calls through, so tests can substitute a stub; [`TcpConnector`] is the
//! production implementation.

use super::addr::SocksAddr;
use crate::error::ConnectError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, warn};

/// Dynamic stream trait for boxed connections
pub trait StreamDyn: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug> StreamDyn for T {}

/// Boxed backend connection
pub type BoxedStream = Box<dyn StreamDyn>;

/// Seam for opening backend connections
///
/// `.await` on [`connect`](Connector::connect) plays the role of the
/// reactor's connect notification; failure to even initiate the attempt is
/// reported as [`ConnectError::InitiationFailed`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the destination
    async fn connect(&self, addr: &SocksAddr) -> Result<BoxedStream, ConnectError>;
}

/// Socket options applied to backend connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout in seconds
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval in seconds
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from the TCP configuration section
    pub fn from_tcp_config(config: &crate::config::TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply the options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Production connector over plain TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    socket_opts: SocketOpts,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector with the given options and timeout
    pub fn new(socket_opts: SocketOpts, connect_timeout: Duration) -> Self {
        TcpConnector {
            socket_opts,
            connect_timeout,
        }
    }

    /// Create a connector with default options and a 10 second timeout
    pub fn with_defaults() -> Self {
        TcpConnector::new(SocketOpts::default(), Duration::from_secs(10))
    }

    async fn connect_literal(&self, target: SocketAddr) -> Result<TcpStream, ConnectError> {
        tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| ConnectError::Timeout)?
            .map_err(ConnectError::Unreachable)
    }
}

/// Pick the connect candidate from resolver output, preferring IPv4
fn choose_candidate(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &SocksAddr) -> Result<BoxedStream, ConnectError> {
        let target = match addr.to_socket_addr() {
            Some(literal) => literal,
            None => {
                let SocksAddr::Domain { name, port } = addr else {
                    return Err(ConnectError::InitiationFailed(
                        "unresolvable address".to_string(),
                    ));
                };
                if name.is_empty() {
                    return Err(ConnectError::InitiationFailed(
                        "empty domain name".to_string(),
                    ));
                }
                let candidates = lookup_host((name.as_str(), *port))
                    .await
                    .map_err(|e| ConnectError::InitiationFailed(e.to_string()))?;
                choose_candidate(candidates).ok_or_else(|| {
                    ConnectError::InitiationFailed(format!("no addresses found for {}", name))
                })?
            }
        };

        debug!("Connecting to backend {} ({})", target, addr);

        let stream = self.connect_literal(target).await?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            warn!("Failed to apply socket options: {}", e);
        }

        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_choose_candidate_prefers_ipv4() {
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        let v4: SocketAddr = "127.0.0.1:80".parse().unwrap();

        assert_eq!(choose_candidate(vec![v6, v4]), Some(v4));
        assert_eq!(choose_candidate(vec![v4, v6]), Some(v4));
        assert_eq!(choose_candidate(vec![v6]), Some(v6));
        assert_eq!(choose_candidate(Vec::new()), None);
    }

    #[test]
    fn test_socket_opts_default() {
        let opts = SocketOpts::default();
        assert!(opts.nodelay);
        assert_eq!(opts.keepalive_secs, Some(20));
        assert_eq!(opts.keepalive_interval, Some(8));
    }

    #[tokio::test]
    async fn test_connect_ipv4_literal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = TcpConnector::with_defaults();
        let addr = SocksAddr::v4([127, 0, 0, 1], port);

        let (result, accepted) = tokio::join!(connector.connect(&addr), listener.accept());
        assert!(result.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Nothing is listening here; the attempt initiates but fails.
        let connector =
            TcpConnector::new(SocketOpts::default(), Duration::from_millis(500));
        let addr = SocksAddr::v4([127, 0, 0, 1], 59998);

        let err = connector.connect(&addr).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectError::Unreachable(_) | ConnectError::Timeout
        ));
    }

    #[tokio::test]
    async fn test_connect_empty_domain_fails_initiation() {
        let connector = TcpConnector::with_defaults();
        let addr = SocksAddr::domain("", 80);

        let err = connector.connect(&addr).await.unwrap_err();
        assert!(matches!(err, ConnectError::InitiationFailed(_)));
    }
}
