//! Relay session
//!
//! Owns one tunnel connection and drives one [`ProxyClient`] over it: the
//! inbound side staged through the ring buffer into the state machine, the
//! backend side pumped back into the tunnel sink. Both read gates are
//! honored, so a backpressured direction stops pulling bytes until the
//! drain path re-enables it.

use crate::error::RelayError;
use crate::relay::{
    BoxedStream, Connector, HandshakeMode, ProxyClient, RelayContext, RingBuffer,
};
use crate::relay::consts::DEFAULT_BUFFER_SIZE;
use crate::tunnel::{FramedSink, PassthroughSink, StreamId, TunnelSink};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tracing::{debug, warn};

/// Driver for one proxied stream over one tunnel connection
pub struct RelaySession {
    ctx: RelayContext,
    connector: Arc<dyn Connector>,
    stream_id: StreamId,
    mode: HandshakeMode,
}

impl RelaySession {
    /// Create a session for one logical stream
    pub fn new(
        ctx: RelayContext,
        connector: Arc<dyn Connector>,
        stream_id: StreamId,
        mode: HandshakeMode,
    ) -> Self {
        RelaySession {
            ctx,
            connector,
            stream_id,
            mode,
        }
    }

    /// Run the session until EOF, error, or protocol failure
    ///
    /// The tunnel stream may be any duplex byte stream; tests drive it with
    /// an in-memory pair.
    pub async fn run<S>(&self, tunnel: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut tunnel_rd, tunnel_wr) = tokio::io::split(tunnel);

        let mut sink: Box<dyn TunnelSink> = if self.ctx.tcp_mux {
            Box::new(FramedSink::new(tunnel_wr))
        } else {
            Box::new(PassthroughSink::new(tunnel_wr))
        };

        let mut client = ProxyClient::new(
            self.stream_id,
            self.mode,
            self.ctx.clone(),
            self.connector.clone(),
        );
        let mut rb = RingBuffer::new();

        let mut tunnel_buf = vec![0u8; DEFAULT_BUFFER_SIZE];
        let mut backend_buf = vec![0u8; DEFAULT_BUFFER_SIZE];
        let mut backend_reader: Option<ReadHalf<BoxedStream>> = None;

        let result = loop {
            if backend_reader.is_none() && client.is_established() {
                backend_reader = client.take_backend_reader();
            }

            tokio::select! {
                read = tunnel_rd.read(&mut tunnel_buf), if client.tunnel_read_enabled() => {
                    let n = match read.context("Tunnel read failed") {
                        Ok(n) => n,
                        Err(e) => break Err(e),
                    };
                    if n == 0 {
                        debug!("Stream {}: tunnel EOF", self.stream_id);
                        break Ok(());
                    }
                    rb.write(&tunnel_buf[..n]);
                    if let Err(e) = drive(&mut client, &mut rb, sink.as_mut()).await {
                        break Err(e.into());
                    }
                }

                read = read_backend(&mut backend_reader, &mut backend_buf),
                    if backend_reader.is_some() && client.backend_read_enabled() =>
                {
                    let n = match read.context("Backend read failed") {
                        Ok(n) => n,
                        Err(e) => break Err(e),
                    };
                    if n == 0 {
                        debug!("Stream {}: backend EOF", self.stream_id);
                        break Ok(());
                    }
                    let data = &backend_buf[..n];
                    let res = if self.ctx.tcp_mux {
                        // Multiplexed delivery belongs to the tunnel's
                        // generic stream dispatch, not the direct path.
                        sink.write_stream(self.stream_id, data)
                            .await
                            .map_err(RelayError::from)
                            .map(|_| ())
                    } else {
                        client
                            .forward_server_to_client(data, sink.as_mut())
                            .await
                            .map(|_| ())
                    };
                    if let Err(e) = res {
                        break Err(e.into());
                    }
                }

                // A backpressured stream drains as the backend accepts the
                // staged remainder; progress re-enables the read gate.
                flushed = flush_pending(&mut client, &mut rb),
                    if !client.tunnel_read_enabled() && !rb.is_empty() =>
                {
                    if let Err(e) = flushed {
                        break Err(e.into());
                    }
                }

                else => {
                    warn!("Stream {}: no pump runnable, closing", self.stream_id);
                    break Ok(());
                }
            }
        };

        client.teardown();
        result
    }
}

/// Feed staged bytes through the state machine until it stops progressing
async fn drive(
    client: &mut ProxyClient,
    rb: &mut RingBuffer,
    sink: &mut dyn TunnelSink,
) -> Result<(), RelayError> {
    while client.tunnel_read_enabled() && !rb.is_empty() {
        let consumed = client.on_tunnel_data(rb, sink).await?;
        if consumed == 0 {
            break;
        }
    }
    Ok(())
}

/// Offer the staged remainder to the backend after a partial accept
async fn flush_pending(
    client: &mut ProxyClient,
    rb: &mut RingBuffer,
) -> Result<(), RelayError> {
    client.forward_client_to_server(rb).await?;
    if rb.is_empty() {
        client.resume_tunnel_read();
    }
    Ok(())
}

/// Read from the backend half once it exists; pends forever before that
async fn read_backend(
    reader: &mut Option<ReadHalf<BoxedStream>>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader.as_mut() {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}
