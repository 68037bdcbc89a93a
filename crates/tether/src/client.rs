//! Configuration and lifecycle plumbing shared by [`ChatClient`] and
//! [`PubSubClient`].
//!
//! [`ChatClient`]: crate::ChatClient
//! [`PubSubClient`]: crate::PubSubClient

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_engine::{Backoff, DispatchMode, Engine, EngineConfig, EngineState, Handler, ReconnectOutcome};
use tether_transport::Connector;
use tokio::sync::{Mutex, watch};
use tracing::warn;

use crate::TetherError;
use crate::keepalive::{Keepalive, KeepaliveConfig, KeepaliveTask, Liveness};

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Full configuration for a protocol client.
///
/// An empty `engine.uri` means "use the client's default endpoint".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint, backoff and dispatch settings.
    pub engine: EngineConfig,
    /// Ping cadence and pong deadline.
    pub keepalive: KeepaliveConfig,
    /// Capacity of the event broadcast channel. Slow subscribers lag
    /// rather than stall the connection.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Subscribers see events in wire order.
            engine: EngineConfig::default().with_dispatch(DispatchMode::Inline),
            keepalive: KeepaliveConfig::default(),
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Overrides the endpoint.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.engine.uri = uri.into();
        self
    }

    /// Replaces the reconnect schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.engine.backoff = backoff;
        self
    }

    /// Replaces the keepalive settings.
    pub fn with_keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Replaces the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Clamp and fix out-of-range values, filling in `default_uri` when no
    /// endpoint is set. Engine and keepalive settings are validated by
    /// their owners.
    pub(crate) fn resolve(mut self, default_uri: &str) -> Self {
        if self.engine.uri.is_empty() {
            self.engine.uri = default_uri.to_string();
        }
        if self.event_capacity == 0 {
            warn!("event_capacity is zero, using default");
            self.event_capacity = Self::default().event_capacity;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ClientCore
// ---------------------------------------------------------------------------

/// An engine plus the keepalive loop that runs while it is started.
pub(crate) struct ClientCore<C: Connector, H: Handler> {
    engine: Engine<C, H>,
    keepalive: KeepaliveConfig,
    liveness: Arc<Liveness>,
    task: Mutex<Option<KeepaliveTask>>,
}

impl<C: Connector, H: Handler> ClientCore<C, H> {
    pub(crate) fn new(
        connector: C,
        handler: H,
        config: ClientConfig,
        liveness: Arc<Liveness>,
    ) -> Self {
        Self {
            engine: Engine::new(connector, handler, config.engine),
            keepalive: config.keepalive,
            liveness,
            task: Mutex::new(None),
        }
    }

    /// Starts the engine, then a keepalive sending the already encoded
    /// `ping`.
    pub(crate) async fn start(&self, ping: String) -> Result<(), TetherError> {
        let mut task = self.task.lock().await;
        self.engine.start().await?;
        let keepalive = Keepalive::new(self.keepalive, ping, Arc::clone(&self.liveness));
        *task = Some(keepalive.spawn(self.engine.clone()));
        Ok(())
    }

    pub(crate) async fn stop(&self) -> Result<(), TetherError> {
        let mut task = self.task.lock().await;
        if let Some(task) = task.take() {
            task.stop().await;
        }
        self.engine.stop().await?;
        Ok(())
    }

    pub(crate) fn enqueue(&self, text: impl Into<String>) {
        self.engine.enqueue(text);
    }

    pub(crate) async fn reconnect(&self) -> ReconnectOutcome {
        self.engine.reconnect().await
    }

    pub(crate) fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.engine.state_receiver()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        self.engine.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dispatch_is_inline() {
        assert_eq!(ClientConfig::default().engine.dispatch, DispatchMode::Inline);
    }

    #[test]
    fn test_resolve_fills_default_uri_only_when_empty() {
        let config = ClientConfig::default().resolve("wss://default.test");
        assert_eq!(config.engine.uri, "wss://default.test");

        let config = ClientConfig::default()
            .with_uri("wss://custom.test")
            .resolve("wss://default.test");
        assert_eq!(config.engine.uri, "wss://custom.test");
    }

    #[test]
    fn test_resolve_fixes_zero_capacity() {
        let config = ClientConfig::default().with_event_capacity(0).resolve("x");
        assert_eq!(config.event_capacity, 256);
    }
}
