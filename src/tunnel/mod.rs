//! Tunnel sink abstraction
//!
//! The relay engine touches the shared tunnel connection through a single
//! primitive: write bytes tagged with a stream identifier and learn how
//! many were accepted. Window accounting and the rest of the multiplexing
//! protocol live behind that primitive, outside this crate's core.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Identifier of one logical stream inside the shared tunnel
pub type StreamId = u32;

/// Outbound side of the tunnel connection
///
/// `write_stream` returns the number of bytes the tunnel accepted; a value
/// smaller than `data.len()` is a backpressure signal, not an error. The
/// caller must stop offering bytes for that stream until the tunnel's
/// drain notification re-enables it.
#[async_trait]
pub trait TunnelSink: Send {
    /// Write bytes tagged with a stream id; returns bytes accepted
    async fn write_stream(&mut self, stream_id: StreamId, data: &[u8]) -> io::Result<usize>;
}

/// Raw byte sink for non-multiplexed tunnels
///
/// The stream id is ignored; the tunnel connection carries exactly one
/// logical stream and every write is accepted in full.
#[derive(Debug)]
pub struct PassthroughSink<W> {
    writer: W,
}

impl<W> PassthroughSink<W> {
    /// Wrap the tunnel's write half
    pub fn new(writer: W) -> Self {
        PassthroughSink { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TunnelSink for PassthroughSink<W> {
    async fn write_stream(&mut self, _stream_id: StreamId, data: &[u8]) -> io::Result<usize> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(data.len())
    }
}

/// Frame-tagging sink for multiplexed tunnels
///
/// Each write becomes one frame: stream id and payload length as
/// big-endian `u32`s, then the payload.
#[derive(Debug)]
pub struct FramedSink<W> {
    writer: W,
}

impl<W> FramedSink<W> {
    /// Wrap the tunnel's write half
    pub fn new(writer: W) -> Self {
        FramedSink { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TunnelSink for FramedSink<W> {
    async fn write_stream(&mut self, stream_id: StreamId, data: &[u8]) -> io::Result<usize> {
        self.writer.write_u32(stream_id).await?;
        self.writer.write_u32(data.len() as u32).await?;
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(data.len())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_passthrough_writes_raw_bytes() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut sink = PassthroughSink::new(near);

        let accepted = sink.write_stream(42, b"raw payload").await.unwrap();
        assert_eq!(accepted, 11);

        let mut buf = [0u8; 11];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"raw payload");
    }

    #[tokio::test]
    async fn test_framed_tags_stream_and_length() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut sink = FramedSink::new(near);

        let accepted = sink.write_stream(7, b"hello").await.unwrap();
        assert_eq!(accepted, 5);

        assert_eq!(far.read_u32().await.unwrap(), 7);
        assert_eq!(far.read_u32().await.unwrap(), 5);
        let mut buf = [0u8; 5];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_framed_empty_payload() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut sink = FramedSink::new(near);

        assert_eq!(sink.write_stream(1, &[]).await.unwrap(), 0);
        assert_eq!(far.read_u32().await.unwrap(), 1);
        assert_eq!(far.read_u32().await.unwrap(), 0);
    }
}
