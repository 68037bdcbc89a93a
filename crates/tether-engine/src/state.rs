//! Observable engine state and connection generations.

use std::fmt;

use tokio::time::Instant;

/// Identifies one physical connection attempt and the tasks it owns.
///
/// Ids increase monotonically for the lifetime of an engine. Exactly one
/// generation is current at a time; tasks of a superseded generation are
/// cancelled and their requests ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationId(u64);

impl GenerationId {
    /// Creates a `GenerationId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// The lifecycle state of an engine.
///
/// ```text
///   Stopped ──(start)──→ Connected ──(loop ends)──→ Reconnecting
///      ↑                   ↑   │                        │
///      │                   │   └──────(stop)────┐       │
///      │                   └──(reconnected)─────┼───────┘
///      └────────────────────────(stop)──────────┴── from either
/// ```
///
/// `Reconnecting` never gives up on its own; only `stop` leaves it
/// other than a successful reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not running. No connection, no background tasks.
    Stopped,

    /// Running with a live connection.
    Connected {
        /// The generation owning the connection.
        generation: GenerationId,
        /// When the connection was established.
        since: Instant,
    },

    /// Running, but the connection was lost and is being re-established.
    Reconnecting {
        /// Number of failed connect attempts in this reconnect sequence.
        attempt: u32,
    },
}

impl EngineState {
    /// Returns `true` unless the engine is stopped.
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Returns `true` if a connection is live.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` while a reconnect sequence is in progress.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Connected { generation, .. } => write!(f, "Connected({generation})"),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting(attempt {attempt})"),
        }
    }
}

/// What a call to [`Engine::reconnect`](crate::Engine::reconnect) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A new connection is live.
    Reconnected,
    /// Nothing happened: a reconnect was already in flight, the request
    /// came from a superseded generation, or the engine is stopped.
    Ignored,
    /// The sequence was cancelled by `stop` before it connected.
    Aborted,
}
