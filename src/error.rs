//! Error types for Ratline
//!
//! This module defines all custom error types used throughout the relay
//! engine. Decode and connect failures stay local to the owning
//! [`ProxyClient`](crate::relay::ProxyClient); they surface to the driver
//! only as "this client is dead".

use std::io;
use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error on the tunnel or backend connection
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed protocol bytes from the peer
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// SOCKS5 address decode failure
    #[error("Address decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Backend connection failure
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Internal invariant violated; the client must be torn down
    #[error("Invariant violation: {0}")]
    Invariant(&'static str),
}

/// Failures while decoding a SOCKS5 address structure
///
/// Every variant is a malformed-input condition: the connection attempt is
/// abandoned, never retried with the same bytes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Address type byte is not 0x01, 0x03 or 0x04
    #[error("Unknown address type: {0:#04x}")]
    UnknownAddrType(u8),

    /// Fewer bytes available than the encoding requires
    #[error("Truncated address: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the encoding requires
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Encoded length exceeds the protocol's worst case
    #[error("Oversized address encoding: {0} bytes")]
    Oversized(usize),

    /// Domain bytes are not valid UTF-8
    #[error("Invalid domain name")]
    InvalidDomain,
}

/// Failures while opening the backend connection
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The connection attempt could not even be initiated
    #[error("Failed to initiate connection: {0}")]
    InitiationFailed(String),

    /// The asynchronous connect failed
    #[error("Destination unreachable: {0}")]
    Unreachable(#[source] io::Error),

    /// The connect did not complete within the configured timeout
    #[error("Connection timed out")]
    Timeout,
}
