//! # Ratline - Client-Side SOCKS5 Relay Engine
//!
//! Ratline is the client-side relay engine of a reverse-tunnel proxy. It
//! connects out to a tunnel server, accepts SOCKS5 negotiations arriving
//! over that tunnel, opens connections to the real destinations, and
//! shuttles bytes bidirectionally, either raw over a dedicated tunnel
//! connection or as tagged logical streams in multiplexed mode, with
//! read-gate backpressure when a downstream buffer cannot keep up.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ratline::config::load_config;
//! use ratline::client::run_client;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_client(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Tunnel Server -> Ratline -> Target
//! ```
//!
//! The [`relay`] module is the core: a pure address codec, an incremental
//! protocol state machine driven per byte-arrival, a backend connector,
//! and the forwarding bridge for established streams. The [`client`]
//! module wires one [`relay::ProxyClient`] per tunnel connection and
//! reconnects with backoff.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod tunnel;

// Re-export commonly used items
pub use client::run_client;
pub use config::{load_config, Config};
pub use error::{ConnectError, DecodeError, RelayError};
pub use relay::{ProxyClient, SocksAddr};

/// Version of the Ratline library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
