//! # Tether
//!
//! Self-reconnecting chat and pub/sub clients.
//!
//! Tether keeps one logical connection alive across network failures,
//! server-initiated reconnects and dead peers. Outbound messages queue up
//! while disconnected and go out in order once a connection is back.
//!
//! ```text
//! ChatClient / PubSubClient      protocol adapters + keepalive
//!            │
//!        tether-engine           start / stop / reconnect / backoff
//!            │
//!       tether-protocol          framing + IRC / JSON codecs
//!            │
//!       tether-transport         WebSocket (or in-memory) connections
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! let client = PubSubClient::new();
//! let mut events = client.subscribe();
//! client.start().await?;
//! let topic: Topic = "chat_moderator_actions.1.2".parse()?;
//! client.listen(&[topic], "token")?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod chat;
mod client;
mod error;
mod keepalive;
mod pubsub;

pub use chat::{CHAT_URI, ChatClient, ChatEvent};
pub use client::ClientConfig;
pub use error::TetherError;
pub use keepalive::{Keepalive, KeepaliveConfig, KeepaliveTask, Liveness};
pub use pubsub::{PUBSUB_URI, PubSubClient, PubSubEvent};

pub use tether_engine as engine;
pub use tether_protocol as protocol;
pub use tether_transport as transport;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::{
        CHAT_URI, ChatClient, ChatEvent, ClientConfig, KeepaliveConfig, PUBSUB_URI, PubSubClient,
        PubSubEvent, TetherError,
    };
    pub use tether_engine::{Backoff, DispatchMode, EngineState, ReconnectOutcome};
    pub use tether_protocol::{ActionKind, Command, IrcMessage, ModeratorAction, Notification, Topic};
}
