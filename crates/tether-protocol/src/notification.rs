//! Typed payloads carried inside pub/sub `MESSAGE` envelopes.
//!
//! The envelope's `data.message` is itself a JSON document shaped
//! `{"type": "...", "data": {...}}`. Which shapes can appear depends on the
//! topic, so decoding dispatches on [`Topic`] first and on the inner
//! `type` second:
//!
//! | Topic | Payload |
//! |---|---|
//! | `chat_moderator_actions` | [`ModeratorAction`] |
//! | `channel-unban-requests` | [`UnbanRequest`] |
//! | `shoutout` | [`Shoutout`] |
//! | `low-trust-users` | [`TreatmentUpdate`] |
//!
//! Payload kinds that are not modelled here, or that lack a field their
//! kind requires, decode to `None`. The raw JSON is still available to
//! callers through [`Incoming::Message`](crate::Incoming::Message).

mod low_trust;
mod moderation;
mod shoutout;
mod unban;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Topic;

pub use low_trust::TreatmentUpdate;
pub use moderation::{ActionKind, ModeratorAction, Term};
pub use shoutout::Shoutout;
pub use unban::{UnbanRequest, UnbanRequestKind};

/// A user referenced by a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    /// Only present in payloads that carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            login: login.into(),
            display_name: None,
        }
    }
}

/// A decoded topic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum Notification {
    ModeratorAction(ModeratorAction),
    UnbanRequest(UnbanRequest),
    Shoutout(Shoutout),
    LowTrustTreatment(TreatmentUpdate),
}

impl Notification {
    /// Decodes the inner `message` of an envelope published on `topic`.
    pub fn decode(topic: &Topic, message: &Value) -> Option<Self> {
        match topic {
            Topic::ChatModeratorActions { .. } => {
                ModeratorAction::from_message(message).map(Self::ModeratorAction)
            }
            Topic::ChannelUnbanRequests { .. } => {
                UnbanRequest::from_message(message).map(Self::UnbanRequest)
            }
            Topic::Shoutout { .. } => Shoutout::from_message(message).map(Self::Shoutout),
            Topic::LowTrustUsers { .. } => {
                TreatmentUpdate::from_message(message).map(Self::LowTrustTreatment)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared decoding helpers
// ---------------------------------------------------------------------------

/// Splits an inner message into its `type` and `data`.
fn envelope(message: &Value) -> Option<(&str, &Value)> {
    let kind = message.get("type")?.as_str()?;
    let data = message.get("data")?;
    Some((kind, data))
}

/// RFC 3339 timestamp; anything else is treated as absent.
fn timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Free-text fields arrive as `""` when unset.
fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
