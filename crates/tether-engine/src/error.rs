//! Error types for the lifecycle engine.

use tether_transport::TransportError;

/// Errors surfaced synchronously by [`Engine`](crate::Engine) operations.
///
/// Only caller misuse and the very first connect are reported this way.
/// Everything that goes wrong after a successful start is recovered by the
/// reconnect loop and shows up only as [`EngineState::Reconnecting`](crate::EngineState).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `start` was called on an engine that is already running.
    #[error("engine is already running")]
    AlreadyRunning,

    /// `stop` was called on an engine that is not running.
    #[error("engine is not running")]
    NotRunning,

    /// The initial connect in `start` failed. The engine stays stopped.
    #[error("initial connect failed: {0}")]
    Connect(#[source] TransportError),
}
