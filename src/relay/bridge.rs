//! Forwarding bridge
//!
//! The steady-state data pumps for an established [`ProxyClient`], one per
//! direction. The multiplexing mode is read once per byte-arrival event
//! from the immutable relay context, not per client.
//!
//! Client→server moves tunnel bytes to the backend; server→client moves
//! backend bytes to the tunnel, tagged with the stream id. Under
//! multiplexing the server→client direction is delivered by the tunnel's
//! generic stream dispatch instead, so reaching it through the direct path
//! is an invariant violation. Zero-length readiness notifications are
//! no-ops in both directions.

use super::proxy::ProxyClient;
use super::ring::RingBuffer;
use crate::error::RelayError;
use crate::tunnel::TunnelSink;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

impl ProxyClient {
    /// Pump staged tunnel bytes into the backend connection
    ///
    /// Non-multiplexed: written directly from the staging buffer's front
    /// slice, no scratch copy, everything consumed. Multiplexed: copied
    /// into the scratch buffer and offered with a single write; on partial
    /// acceptance only the accepted bytes are consumed and the tunnel read
    /// gate is disabled until the backend's drain notification re-enables
    /// it. The unaccepted remainder stays staged.
    pub(crate) async fn forward_client_to_server(
        &mut self,
        rb: &mut RingBuffer,
    ) -> Result<usize, RelayError> {
        let len = rb.len();
        if len == 0 {
            // Readiness edge with no payload.
            return Ok(0);
        }

        let mux = self.ctx.tcp_mux;
        let stream_id = self.stream_id();

        let Some(backend) = self.backend.as_mut() else {
            debug_assert!(false, "established stream without backend connection");
            error!(
                "Stream {}: established without a backend connection",
                stream_id
            );
            self.teardown();
            return Err(RelayError::Invariant(
                "established stream without backend connection",
            ));
        };

        if !mux {
            backend.writer.write_all(rb.peek()).await?;
            rb.consume(len);
            return Ok(len);
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(rb.peek());

        let accepted = backend.writer.write(&self.scratch).await?;
        rb.consume(accepted);

        if accepted < len {
            debug!(
                "Stream {}: partial write {}/{} bytes, disabling tunnel read",
                stream_id, accepted, len
            );
            self.tunnel_read_enabled = false;
        }

        Ok(accepted)
    }

    /// Pump backend bytes back into the tunnel, tagged for this stream
    ///
    /// Only valid in non-multiplexed mode; the tunnel's generic stream
    /// dispatch owns this direction under multiplexing. On partial sink
    /// acceptance the backend read gate is disabled until the tunnel's
    /// drain notification re-enables it.
    pub async fn forward_server_to_client(
        &mut self,
        data: &[u8],
        tunnel: &mut dyn TunnelSink,
    ) -> Result<usize, RelayError> {
        if data.is_empty() {
            return Ok(0);
        }

        let stream_id = self.stream_id();

        if self.ctx.tcp_mux {
            debug_assert!(
                false,
                "multiplexed server-to-client data reached the direct path"
            );
            error!(
                "Stream {}: multiplexed server-to-client data reached the direct path",
                stream_id
            );
            self.teardown();
            return Err(RelayError::Invariant(
                "multiplexed server-to-client data on direct path",
            ));
        }

        if !self.is_established() || self.backend.is_none() {
            debug_assert!(false, "server-to-client data before establishment");
            error!("Stream {}: backend data before establishment", stream_id);
            self.teardown();
            return Err(RelayError::Invariant(
                "server-to-client data before establishment",
            ));
        }

        let accepted = tunnel.write_stream(stream_id, data).await?;

        if accepted < data.len() {
            debug!(
                "Stream {}: tunnel accepted {}/{} bytes, disabling backend read",
                stream_id,
                accepted,
                data.len()
            );
            self.backend_read_enabled = false;
        }

        Ok(accepted)
    }
}
