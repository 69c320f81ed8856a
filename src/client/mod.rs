//! Client runner
//!
//! Connects to the tunnel server and serves relay sessions until shutdown,
//! reconnecting with bounded exponential backoff.

mod session;

pub use session::RelaySession;

use crate::config::Config;
use crate::error::RelayError;
use crate::relay::{Connector, HandshakeMode, RelayContext, SocketOpts, TcpConnector};
use crate::tunnel::StreamId;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Run the relay client until shutdown
///
/// Each tunnel connection carries one proxied stream; when a session ends
/// cleanly the client reconnects for the next one. Session errors retry
/// with exponential backoff, giving up after ten consecutive failures.
pub async fn run_client(config: Config, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let client_config = config.client;
    client_config.validate().map_err(RelayError::Config)?;

    let ctx = RelayContext::from(&client_config.relay);
    let socket_opts = SocketOpts::from_tcp_config(&client_config.tcp);
    let connector: Arc<dyn Connector> = Arc::new(TcpConnector::new(
        socket_opts.clone(),
        ctx.connect_timeout,
    ));
    let mode = if client_config.relay.legacy_handshake {
        HandshakeMode::Legacy
    } else {
        HandshakeMode::Full
    };

    info!("Starting Ratline client");
    info!("Tunnel server: {}", client_config.remote_addr);
    info!(
        "Multiplexing: {}, handshake: {:?}",
        ctx.tcp_mux, mode
    );

    let mut retry_count: u32 = 0;
    let max_retries = 10;
    let base_delay = Duration::from_secs(1);
    let max_delay = Duration::from_secs(60);
    let mut next_stream_id: StreamId = 0;

    loop {
        let session = RelaySession::new(ctx.clone(), connector.clone(), next_stream_id, mode);
        next_stream_id = next_stream_id.wrapping_add(1);

        tokio::select! {
            result = serve_once(&client_config.remote_addr, &socket_opts, session) => {
                match result {
                    Ok(()) => {
                        info!("Tunnel session closed normally");
                        retry_count = 0;
                    }
                    Err(e) => {
                        retry_count += 1;
                        if retry_count > max_retries {
                            error!("Max retries exceeded, giving up");
                            return Err(e);
                        }

                        let delay =
                            std::cmp::min(base_delay * 2u32.pow(retry_count - 1), max_delay);

                        warn!(
                            "Tunnel session error: {:#}. Reconnecting in {:?}... (attempt {}/{})",
                            e, delay, retry_count, max_retries
                        );

                        tokio::time::sleep(delay).await;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping client");
                break;
            }
        }
    }

    Ok(())
}

/// Connect one tunnel connection and run one session over it
async fn serve_once(addr: &str, opts: &SocketOpts, session: RelaySession) -> Result<()> {
    info!("Connecting to tunnel server: {}", addr);

    let tunnel = TcpStream::connect(addr)
        .await
        .context("Failed to connect to tunnel server")?;

    if let Err(e) = opts.apply(&tunnel) {
        warn!("Failed to apply socket options: {}", e);
    }

    info!("Tunnel connection established");

    session.run(tunnel).await
}
