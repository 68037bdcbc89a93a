//! Pub/sub client: JSON envelopes over a self-reconnecting WebSocket.
//!
//! Each inbound envelope is published twice: first raw as
//! [`PubSubEvent::Payload`], then decoded (`Pong`, `Reconnect`,
//! `Response`, `Message` or `Unknown`). A `Message` on a known topic whose
//! payload decodes is followed by a typed [`PubSubEvent::Notification`].
//! Subscriptions are not replayed after a reconnect; listen again on
//! [`PubSubEvent::Connected`].

use std::sync::Arc;

use serde_json::Value;
use tether_engine::{EngineConfig, EngineState, Handler, HookResult, Link, ReconnectOutcome};
use tether_protocol::{
    Codec, Incoming, Notification, ProtocolError, PubSubCodec, Request, SplitPolicy, Topic,
    generate_nonce,
};
use tether_transport::{Connector, WebSocketConnector};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

use crate::TetherError;
use crate::client::{ClientConfig, ClientCore};
use crate::keepalive::Liveness;

/// Default pub/sub endpoint.
pub const PUBSUB_URI: &str = "wss://pubsub-edge.twitch.tv";

/// Something the pub/sub connection produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PubSubEvent {
    /// A connection (initial or reconnect) was established.
    Connected,
    /// Every well-formed envelope, before decoding.
    Payload(Value),
    Pong,
    /// The server is about to drop the connection; the client reconnects.
    Reconnect,
    /// Outcome of a `LISTEN`/`UNLISTEN`. `error` is empty on success.
    Response { error: String, nonce: Option<String> },
    /// A message published on a topic.
    Message { topic: String, message: Value },
    /// The typed form of the preceding `Message`.
    Notification {
        topic: Topic,
        notification: Notification,
    },
    /// An envelope of a type this client does not decode.
    Unknown(Value),
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

struct PubSubHandler {
    events: broadcast::Sender<PubSubEvent>,
    liveness: Arc<Liveness>,
}

impl PubSubHandler {
    fn publish(&self, event: PubSubEvent) {
        if self.events.send(event).is_err() {
            trace!("no pub/sub subscribers");
        }
    }
}

impl Handler for PubSubHandler {
    fn split_policy(&self) -> SplitPolicy {
        SplitPolicy::Whole
    }

    async fn on_connected(&self, _link: Link) -> HookResult {
        self.publish(PubSubEvent::Connected);
        Ok(())
    }

    async fn on_message(&self, text: String, link: Link) -> HookResult {
        let root: Value = serde_json::from_str(&text).map_err(ProtocolError::Decode)?;
        self.publish(PubSubEvent::Payload(root.clone()));

        let event = match Incoming::from_value(&root)? {
            Incoming::Pong => {
                self.liveness.mark_pong();
                PubSubEvent::Pong
            }
            Incoming::Reconnect => {
                info!(generation = %link.generation(), "server requested reconnect");
                link.reconnect();
                PubSubEvent::Reconnect
            }
            Incoming::Response { error, nonce } => PubSubEvent::Response { error, nonce },
            Incoming::Message { topic, message } => {
                let typed = decode_notification(&topic, &message);
                self.publish(PubSubEvent::Message { topic, message });
                match typed {
                    Some((topic, notification)) => PubSubEvent::Notification {
                        topic,
                        notification,
                    },
                    None => return Ok(()),
                }
            }
            Incoming::Unknown(value) => PubSubEvent::Unknown(value),
        };
        self.publish(event);
        Ok(())
    }
}

fn decode_notification(topic: &str, message: &Value) -> Option<(Topic, Notification)> {
    let Ok(parsed) = topic.parse::<Topic>() else {
        trace!(topic, "message on unmodelled topic");
        return None;
    };
    match Notification::decode(&parsed, message) {
        Some(notification) => Some((parsed, notification)),
        None => {
            debug!(topic, "topic message not decoded");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// PubSubClient
// ---------------------------------------------------------------------------

/// A pub/sub connection that keeps itself alive.
pub struct PubSubClient<C: Connector = WebSocketConnector> {
    core: ClientCore<C, PubSubHandler>,
    codec: PubSubCodec,
    events: broadcast::Sender<PubSubEvent>,
}

impl PubSubClient<WebSocketConnector> {
    /// A WebSocket client for [`PUBSUB_URI`] with default settings.
    pub fn new() -> Self {
        Self::with_config(WebSocketConnector::new(), ClientConfig::default())
    }
}

impl Default for PubSubClient<WebSocketConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> PubSubClient<C> {
    /// A client over `connector`. An empty URI in `config` means [`PUBSUB_URI`].
    pub fn with_config(connector: C, config: ClientConfig) -> Self {
        let config = config.resolve(PUBSUB_URI);
        let (events, _) = broadcast::channel(config.event_capacity);
        let liveness = Arc::new(Liveness::default());
        let handler = PubSubHandler {
            events: events.clone(),
            liveness: Arc::clone(&liveness),
        };
        Self {
            core: ClientCore::new(connector, handler, config, liveness),
            codec: PubSubCodec,
            events,
        }
    }

    /// Connects and starts the keepalive.
    pub async fn start(&self) -> Result<(), TetherError> {
        let ping = self.codec.serialize(&Request::ping())?;
        self.core.start(ping).await
    }

    /// Stops the keepalive, closes the connection and drops queued requests.
    pub async fn stop(&self) -> Result<(), TetherError> {
        self.core.stop().await
    }

    /// Forces a reconnect and waits for it to settle.
    pub async fn reconnect(&self) -> ReconnectOutcome {
        self.core.reconnect().await
    }

    pub fn state(&self) -> EngineState {
        self.core.state()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.core.state_receiver()
    }

    /// The engine configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        self.core.config()
    }

    /// A receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PubSubEvent> {
        self.events.subscribe()
    }

    /// Queues a request as is.
    pub fn send(&self, request: &Request) -> Result<(), TetherError> {
        self.core.enqueue(self.codec.serialize(request)?);
        Ok(())
    }

    /// Queues a `LISTEN` for `topics` and returns its nonce. The server
    /// answers with a [`PubSubEvent::Response`] carrying the same nonce.
    pub fn listen(&self, topics: &[Topic], auth_token: &str) -> Result<String, TetherError> {
        let nonce = generate_nonce();
        self.send(&Request::listen(
            topic_names(topics),
            auth_token,
            Some(nonce.clone()),
        ))?;
        Ok(nonce)
    }

    /// Queues an `UNLISTEN` for `topics` and returns its nonce.
    pub fn unlisten(&self, topics: &[Topic]) -> Result<String, TetherError> {
        let nonce = generate_nonce();
        self.send(&Request::unlisten(topic_names(topics), Some(nonce.clone())))?;
        Ok(nonce)
    }
}

impl<C: Connector> std::fmt::Debug for PubSubClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubClient")
            .field("uri", &self.config().uri)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn topic_names(topics: &[Topic]) -> Vec<String> {
    topics.iter().map(Topic::to_string).collect()
}
