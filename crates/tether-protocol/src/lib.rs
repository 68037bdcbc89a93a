//! Framing and wire codecs for Tether.
//!
//! This crate sits between raw connections and protocol adapters:
//!
//! - **Framer** ([`Framer`], [`SplitPolicy`]) — cuts transport units into
//!   logical text messages and writes messages back as whole units.
//! - **Codec** ([`Codec`]) — maps logical messages to typed ones:
//!   [`IrcCodec`] for the line-oriented chat protocol, [`PubSubCodec`] for
//!   the JSON envelope protocol.
//! - **Topics** ([`Topic`]) — pub/sub topic strings.
//! - **Notifications** ([`Notification`]) — typed topic payloads: moderator
//!   actions, unban requests, shoutouts and low-trust treatment updates.
//!
//! ```text
//! Transport (units) → Framer (strings) → Codec (typed messages)
//! ```

mod codec;
mod error;
mod framer;
pub mod irc;
pub mod notification;
pub mod pubsub;
mod topic;

pub use codec::Codec;
pub use error::ProtocolError;
pub use framer::{FrameWriter, Framer, Inbound, SplitPolicy};
pub use irc::{Command, IrcCodec, IrcMessage};
pub use notification::{
    ActionKind, ModeratorAction, Notification, Shoutout, Term, TreatmentUpdate, UnbanRequest,
    UnbanRequestKind, User,
};
pub use pubsub::{Incoming, PayloadType, PubSubCodec, Request, RequestData, generate_nonce};
pub use topic::Topic;
