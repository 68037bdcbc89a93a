//! Unified error type for the Tether clients.

use tether_engine::EngineError;
use tether_protocol::ProtocolError;
use tether_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A transport-level error (connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lifecycle error (already running, not running, initial connect).
    #[error(transparent)]
    Engine(#[from] EngineError),
}
