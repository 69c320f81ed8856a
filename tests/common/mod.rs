//! Test utilities and mocks for Ratline
//!
//! This module provides common test utilities used across integration tests.

use async_trait::async_trait;
use ratline::error::ConnectError;
use ratline::relay::{BoxedStream, Connector, SocksAddr};
use ratline::tunnel::{StreamId, TunnelSink};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::TcpListener;

/// Start a one-shot echo backend on an ephemeral port
///
/// Accepts a single connection and echoes everything it reads back to the
/// sender until EOF.
pub async fn spawn_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        let mut buf = [0u8; 4096];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if stream.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });

    addr
}

/// Stream wrapper that counts how many times it is dropped
///
/// Used to verify that teardown releases the backend connection exactly
/// once.
#[derive(Debug)]
pub struct CountingStream {
    inner: DuplexStream,
    drops: Arc<AtomicUsize>,
}

impl Drop for CountingStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for CountingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Connector handing out drop-counted in-memory backends
pub struct CountingConnector {
    drops: Arc<AtomicUsize>,
    peers: Mutex<Vec<DuplexStream>>,
}

impl CountingConnector {
    pub fn new() -> Self {
        CountingConnector {
            drops: Arc::new(AtomicUsize::new(0)),
            peers: Mutex::new(Vec::new()),
        }
    }

    /// How many backend connections have been released so far
    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, _addr: &SocksAddr) -> Result<BoxedStream, ConnectError> {
        let (near, far) = duplex(4096);
        self.peers.lock().unwrap().push(far);
        Ok(Box::new(CountingStream {
            inner: near,
            drops: self.drops.clone(),
        }))
    }
}

/// Tunnel sink that records every tagged write
pub struct CollectingSink {
    pub writes: Vec<(StreamId, Vec<u8>)>,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink { writes: Vec::new() }
    }
}

#[async_trait]
impl TunnelSink for CollectingSink {
    async fn write_stream(&mut self, stream_id: StreamId, data: &[u8]) -> std::io::Result<usize> {
        self.writes.push((stream_id, data.to_vec()));
        Ok(data.len())
    }
}
