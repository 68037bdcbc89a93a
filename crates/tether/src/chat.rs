//! Chat client: IRC lines over a self-reconnecting WebSocket.
//!
//! The handler answers server `PING`s, records `PONG`s for the keepalive,
//! and reconnects when the server sends `RECONNECT`. Everything it reads
//! is published as a [`ChatEvent`]. Logging in and joining channels is up
//! to the application; re-send them on every [`ChatEvent::Connected`].

use std::sync::Arc;

use tether_engine::{EngineConfig, EngineState, Handler, HookResult, Link, ReconnectOutcome};
use tether_protocol::{Codec, Command, IrcCodec, IrcMessage, SplitPolicy};
use tether_transport::{Connector, WebSocketConnector};
use tokio::sync::{broadcast, watch};
use tracing::{info, trace};

use crate::TetherError;
use crate::client::{ClientConfig, ClientCore};
use crate::keepalive::Liveness;

/// Default chat endpoint.
pub const CHAT_URI: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Something the chat connection produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A connection (initial or reconnect) was established.
    Connected,
    /// A line that parsed as an IRC message, including `PING`/`PONG`.
    Message(IrcMessage),
    /// A line that did not parse.
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

struct ChatHandler {
    codec: IrcCodec,
    events: broadcast::Sender<ChatEvent>,
    liveness: Arc<Liveness>,
}

impl ChatHandler {
    fn publish(&self, event: ChatEvent) {
        if self.events.send(event).is_err() {
            trace!("no chat subscribers");
        }
    }
}

impl Handler for ChatHandler {
    fn split_policy(&self) -> SplitPolicy {
        SplitPolicy::Lines
    }

    async fn on_connected(&self, _link: Link) -> HookResult {
        self.publish(ChatEvent::Connected);
        Ok(())
    }

    async fn on_message(&self, text: String, link: Link) -> HookResult {
        let message = match self.codec.parse(&text) {
            Ok(message) => message,
            Err(e) => {
                trace!(message = %text, error = %e, "unknown chat line");
                self.publish(ChatEvent::Unknown(text));
                return Ok(());
            }
        };

        match message.command {
            Command::Ping => {
                let mut pong = IrcMessage::new(Command::Pong);
                pong.params = message.params.clone();
                link.enqueue(self.codec.serialize(&pong)?);
            }
            Command::Pong => self.liveness.mark_pong(),
            Command::Reconnect => {
                info!(generation = %link.generation(), "server requested reconnect");
                link.reconnect();
            }
            _ => {}
        }

        self.publish(ChatEvent::Message(message));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// A chat connection that keeps itself alive.
///
/// ```rust,no_run
/// use tether::prelude::*;
///
/// # async fn run() -> Result<(), TetherError> {
/// let client = ChatClient::new();
/// let mut events = client.subscribe();
/// client.start().await?;
/// while let Ok(event) = events.recv().await {
///     if event == ChatEvent::Connected {
///         client.send_raw("NICK justinfan123");
///         client.join("#rust");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatClient<C: Connector = WebSocketConnector> {
    core: ClientCore<C, ChatHandler>,
    codec: IrcCodec,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatClient<WebSocketConnector> {
    /// A WebSocket client for [`CHAT_URI`] with default settings.
    pub fn new() -> Self {
        Self::with_config(WebSocketConnector::new(), ClientConfig::default())
    }
}

impl Default for ChatClient<WebSocketConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ChatClient<C> {
    /// A client over `connector`. An empty URI in `config` means [`CHAT_URI`].
    pub fn with_config(connector: C, config: ClientConfig) -> Self {
        let config = config.resolve(CHAT_URI);
        let (events, _) = broadcast::channel(config.event_capacity);
        let liveness = Arc::new(Liveness::default());
        let codec = IrcCodec;
        let handler = ChatHandler {
            codec,
            events: events.clone(),
            liveness: Arc::clone(&liveness),
        };
        Self {
            core: ClientCore::new(connector, handler, config, liveness),
            codec,
            events,
        }
    }

    /// Connects and starts the keepalive.
    pub async fn start(&self) -> Result<(), TetherError> {
        let ping = self.codec.serialize(&IrcMessage::new(Command::Ping))?;
        self.core.start(ping).await
    }

    /// Stops the keepalive, closes the connection and drops queued lines.
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
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Queues a message.
    pub fn send(&self, message: &IrcMessage) -> Result<(), TetherError> {
        self.core.enqueue(self.codec.serialize(message)?);
        Ok(())
    }

    /// Queues a raw line, sent as is.
    pub fn send_raw(&self, line: impl Into<String>) {
        self.core.enqueue(line);
    }

    /// Queues `JOIN <channel>`.
    pub fn join(&self, channel: &str) {
        self.core.enqueue(IrcMessage::join(channel).to_string());
    }

    /// Queues `PART <channel>`.
    pub fn part(&self, channel: &str) {
        self.core.enqueue(IrcMessage::part(channel).to_string());
    }

    /// Queues `PRIVMSG <channel> :<text>`.
    pub fn privmsg(&self, channel: &str, text: &str) {
        self.core.enqueue(IrcMessage::privmsg(channel, text).to_string());
    }
}

impl<C: Connector> std::fmt::Debug for ChatClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("uri", &self.config().uri)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
