//! Inbound staging buffer
//!
//! FIFO byte buffer between the tunnel and the protocol engine. The state
//! machine peeks at the front, decides how far it can make progress, and
//! consumes exactly that many bytes; partial protocol messages stay staged
//! until more data arrives. Backed by a contiguous [`BytesMut`] so the
//! non-multiplexed pump can write straight from the front slice.

use bytes::{Buf, BytesMut};

use super::consts::DEFAULT_BUFFER_SIZE;

/// FIFO staging buffer for inbound tunnel bytes
#[derive(Debug, Default)]
pub struct RingBuffer {
    buf: BytesMut,
}

impl RingBuffer {
    /// Create an empty buffer with the default capacity
    pub fn new() -> Self {
        RingBuffer {
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Number of staged bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when no bytes are staged
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append bytes arriving from the tunnel
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Borrow all staged bytes without consuming them
    pub fn peek(&self) -> &[u8] {
        &self.buf
    }

    /// Copy up to `dst.len()` bytes off the front, consuming them
    ///
    /// Returns the number of bytes copied.
    pub fn pop(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.buf.len());
        dst[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        n
    }

    /// Discard `n` bytes off the front
    ///
    /// Panics if `n` exceeds the staged length; consumption is always
    /// bounded by a prior peek.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.buf.len(), "consume past end of staged bytes");
        self.buf.advance(n);
    }
}
