//! SOCKS5 protocol state machine
//!
//! [`ProxyClient`] is the per-logical-connection state container. It is
//! driven incrementally: [`on_tunnel_data`] is invoked once per arrival of
//! tunnel-side bytes and reports how many bytes it consumed. `Ok(0)` means
//! a partial protocol message is still pending (wait for more data), not
//! an error. Reassembly is the staging buffer's job; the machine itself
//! never buffers partial messages.
//!
//! The legacy direct-connect variant and the full handshake variant are one
//! machine parameterized by [`HandshakeMode`], selected at construction.
//!
//! [`on_tunnel_data`]: ProxyClient::on_tunnel_data

use super::addr::SocksAddr;
use super::connector::{BoxedStream, Connector};
use super::consts::*;
use super::ring::RingBuffer;
use super::RelayContext;
use crate::error::RelayError;
use crate::tunnel::{StreamId, TunnelSink};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tracing::debug;

/// Protocol phase of a proxied connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Waiting for the first bytes of the negotiation
    Init,
    /// Greeting accepted, waiting for the connect request
    Handshake,
    /// Backend connected; all bytes are opaque payload
    Established,
}

/// Negotiation style, fixed when the client is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    /// Full SOCKS5 greeting and connect request
    Full,
    /// Older peers send a bare address with no negotiation
    Legacy,
}

/// Outbound connection halves toward the real destination
///
/// The reader is handed to the driver for the server-to-client pump; the
/// writer stays here for the client-to-server pump. Both are released
/// together on teardown.
#[derive(Debug)]
pub(crate) struct Backend {
    pub(crate) writer: WriteHalf<BoxedStream>,
    pub(crate) reader: Option<ReadHalf<BoxedStream>>,
}

/// Per-logical-connection relay state
///
/// Owns the backend connection; the tunnel connection is borrowed per call
/// and never owned. Torn down on EOF, protocol error, or connect failure.
pub struct ProxyClient {
    stream_id: StreamId,
    mode: HandshakeMode,
    state: ProxyState,
    pub(crate) ctx: RelayContext,
    connector: Arc<dyn Connector>,
    remote_addr: Option<SocksAddr>,
    pub(crate) backend: Option<Backend>,
    pub(crate) tunnel_read_enabled: bool,
    pub(crate) backend_read_enabled: bool,
    pub(crate) scratch: BytesMut,
}

impl ProxyClient {
    /// Create a client for one proxied stream
    pub fn new(
        stream_id: StreamId,
        mode: HandshakeMode,
        ctx: RelayContext,
        connector: Arc<dyn Connector>,
    ) -> Self {
        ProxyClient {
            stream_id,
            mode,
            state: ProxyState::Init,
            ctx,
            connector,
            remote_addr: None,
            backend: None,
            tunnel_read_enabled: true,
            backend_read_enabled: true,
            scratch: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Current protocol phase
    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Stream identifier this client's traffic is tagged with
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Destination decoded from the connect request, once known
    pub fn remote_addr(&self) -> Option<&SocksAddr> {
        self.remote_addr.as_ref()
    }

    /// True once the backend is connected
    pub fn is_established(&self) -> bool {
        self.state == ProxyState::Established
    }

    /// May the driver pull more tunnel bytes for this stream?
    pub fn tunnel_read_enabled(&self) -> bool {
        self.tunnel_read_enabled
    }

    /// May the driver pull more backend bytes for this stream?
    pub fn backend_read_enabled(&self) -> bool {
        self.backend_read_enabled
    }

    /// Re-enable tunnel reads after the backend signalled it has drained
    ///
    /// Called by the drain-notification collaborator, never by the pumps
    /// themselves.
    pub fn resume_tunnel_read(&mut self) {
        self.tunnel_read_enabled = true;
    }

    /// Re-enable backend reads after the tunnel signalled it has drained
    pub fn resume_backend_read(&mut self) {
        self.backend_read_enabled = true;
    }

    /// Hand the backend read half to the driver for the
    /// server-to-client pump
    pub fn take_backend_reader(&mut self) -> Option<ReadHalf<BoxedStream>> {
        self.backend.as_mut().and_then(|b| b.reader.take())
    }

    /// Consume inbound tunnel bytes according to the current state
    ///
    /// Returns the number of bytes consumed from `rb`. `Ok(0)` with data
    /// still staged means "insufficient data, try again when more
    /// arrives". Any error is terminal for this client; the caller tears
    /// the connection down.
    pub async fn on_tunnel_data(
        &mut self,
        rb: &mut RingBuffer,
        tunnel: &mut dyn TunnelSink,
    ) -> Result<usize, RelayError> {
        let len = rb.len();

        match (self.mode, self.state) {
            (_, ProxyState::Established) => self.forward_client_to_server(rb).await,

            (HandshakeMode::Full, ProxyState::Init) if len >= SOCKS5_GREETING.len() => {
                self.handle_greeting(rb, tunnel).await
            }

            (HandshakeMode::Full, ProxyState::Handshake) if len >= SOCKS5_MIN_CONNECT_LEN => {
                self.handle_connect_request(rb).await
            }

            (HandshakeMode::Legacy, ProxyState::Init) if len >= SOCKS5_MIN_LEGACY_LEN => {
                self.handle_legacy_connect(rb).await
            }

            // Partial protocol message; reassembly happens upstream.
            (HandshakeMode::Full, ProxyState::Init | ProxyState::Handshake)
            | (HandshakeMode::Legacy, ProxyState::Init) => Ok(0),

            // Legacy peers never negotiate; this state is unreachable
            // through normal transitions.
            (HandshakeMode::Legacy, ProxyState::Handshake) => {
                self.teardown();
                Err(RelayError::Invariant("handshake state in legacy mode"))
            }
        }
    }

    /// Validate the greeting and accept "no authentication"
    async fn handle_greeting(
        &mut self,
        rb: &mut RingBuffer,
        tunnel: &mut dyn TunnelSink,
    ) -> Result<usize, RelayError> {
        debug!(
            "Stream {}: processing SOCKS5 greeting, {} bytes staged",
            self.stream_id,
            rb.len()
        );

        let mut greeting = [0u8; 3];
        rb.pop(&mut greeting);

        if greeting != SOCKS5_GREETING {
            // The bytes stay consumed so a caller that chooses to
            // resynchronize is not offset; this caller drops the stream.
            return Err(RelayError::Protocol(format!(
                "invalid greeting {:02x?}",
                greeting
            )));
        }

        tunnel
            .write_stream(self.stream_id, &SOCKS5_GREETING_REPLY)
            .await?;
        self.state = ProxyState::Handshake;
        Ok(3)
    }

    /// Validate the connect request, decode the target, open the backend
    async fn handle_connect_request(&mut self, rb: &mut RingBuffer) -> Result<usize, RelayError> {
        debug!(
            "Stream {}: processing SOCKS5 connect request, {} bytes staged",
            self.stream_id,
            rb.len()
        );

        let mut head = [0u8; 3];
        rb.pop(&mut head);

        if !is_connect_request(&head) {
            return Err(RelayError::Protocol(format!(
                "invalid connect request {:02x?}",
                head
            )));
        }

        let (addr, consumed) = SocksAddr::decode(rb.peek())?;
        rb.consume(consumed);

        self.establish(addr).await?;
        Ok(3 + consumed)
    }

    /// Legacy path: a bare address, no negotiation
    async fn handle_legacy_connect(&mut self, rb: &mut RingBuffer) -> Result<usize, RelayError> {
        debug!(
            "Stream {}: processing legacy connect, {} bytes staged",
            self.stream_id,
            rb.len()
        );

        let (addr, consumed) = SocksAddr::decode(rb.peek())?;
        rb.consume(consumed);

        self.establish(addr).await?;
        Ok(consumed)
    }

    /// Connect the backend and move to `Established`
    ///
    /// No SOCKS5 reply is sent after the connect: the reverse-tunnel peer
    /// expects payload flow to begin immediately.
    async fn establish(&mut self, addr: SocksAddr) -> Result<(), RelayError> {
        debug!("Stream {}: connecting to {}", self.stream_id, addr);

        let stream = self.connector.connect(&addr).await?;
        let (reader, writer) = tokio::io::split(stream);

        self.remote_addr = Some(addr);
        self.backend = Some(Backend {
            writer,
            reader: Some(reader),
        });
        self.state = ProxyState::Established;

        debug!("Stream {}: backend connection established", self.stream_id);
        Ok(())
    }

    /// Release the backend connection and disable both read gates
    ///
    /// Safe to call from both directions' failure paths in the same turn:
    /// the ownership handle is taken on the first call, so the connection
    /// is released exactly once.
    pub fn teardown(&mut self) {
        if let Some(backend) = self.backend.take() {
            debug!("Stream {}: releasing backend connection", self.stream_id);
            drop(backend);
        }
        self.tunnel_read_enabled = false;
        self.backend_read_enabled = false;
    }
}

/// Check the version/command/reserved triple of a connect request
fn is_connect_request(buf: &[u8]) -> bool {
    buf.len() >= 3
        && buf[0] == SOCKS5_VERSION
        && buf[1] == SOCKS5_CMD_TCP_CONNECT
        && buf[2] == SOCKS5_RESERVED
}
