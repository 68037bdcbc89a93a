//! Client transport abstraction layer for Tether.
//!
//! Provides the [`Connector`] and [`Connection`] traits: the physical socket
//! capability the framer and lifecycle engine are built on. A transport only
//! knows how to connect, move whole text units, and close. It never looks
//! inside the payloads.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket client via `tokio-tungstenite`
//! - `tls` — `wss://` support through rustls with native roots
//! - `memory` — in-process scripted transport for tests

use std::fmt;
use std::future::Future;

mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One unit read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A piece of an inbound message.
    ///
    /// `end_of_message` is set on the last piece of a logical transport
    /// unit. Transports that reassemble frames themselves always set it.
    Fragment {
        /// Raw payload bytes.
        data: Vec<u8>,
        /// Whether this fragment completes the unit.
        end_of_message: bool,
    },

    /// The remote end performed a close handshake.
    Close,
}

impl Received {
    /// A fragment that completes its unit on its own.
    pub fn whole(data: impl Into<Vec<u8>>) -> Self {
        Self::Fragment {
            data: data.into(),
            end_of_message: true,
        }
    }
}

/// Opens outbound connections to a remote endpoint.
///
/// The returned futures are `Send` so the lifecycle engine can drive them
/// from spawned Tokio tasks.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Connects to `uri` and completes the transport handshake.
    fn connect(
        &self,
        uri: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single live connection that can send and receive text units.
///
/// `send` and `recv` may be called concurrently from different tasks.
/// Dropping an in-flight `recv` future must not lose already-buffered data
/// beyond the unit being read.
pub trait Connection: Send + Sync + 'static {
    /// Sends one complete text message as a single, final transport unit.
    fn send(&self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next fragment or a close notification.
    fn recv(&self) -> impl Future<Output = Result<Received, TransportError>> + Send;

    /// Performs the close handshake, if the connection is still open.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
