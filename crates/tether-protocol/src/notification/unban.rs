//! `channel-unban-requests` payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{User, envelope, timestamp};

/// An unban request was filed or resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbanRequest {
    pub id: String,
    /// The banned user asking to be unbanned.
    pub requester: User,
    pub kind: UnbanRequestKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnbanRequestKind {
    /// `create_unban_request`
    Create {
        channel_id: String,
        created_at: DateTime<Utc>,
        message: String,
        profile_image_url: String,
    },
    /// `update_unban_request`: a moderator approved or denied it, or the
    /// requester withdrew it.
    Update {
        resolver: User,
        resolver_message: String,
        /// e.g. `approved`, `denied`, `canceled`.
        status: String,
    },
}

impl UnbanRequest {
    /// Decodes the inner message of a `channel-unban-requests` envelope.
    pub fn from_message(message: &Value) -> Option<Self> {
        let (kind, data) = envelope(message)?;
        let raw = RawUnbanRequest::deserialize(data).ok()?;

        let kind = match kind {
            "create_unban_request" => UnbanRequestKind::Create {
                channel_id: raw.channel_id?,
                created_at: timestamp(raw.created_at.as_deref())?,
                message: raw.requester_message?,
                profile_image_url: raw.requester_profile_image?,
            },
            "update_unban_request" => UnbanRequestKind::Update {
                resolver: User::new(raw.resolver_id?, raw.resolver_login?),
                resolver_message: raw.resolver_message?,
                status: raw.status?,
            },
            _ => return None,
        };

        Some(Self {
            id: raw.id?,
            requester: User::new(raw.requester_id?, raw.requester_login?),
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawUnbanRequest {
    id: Option<String>,
    requester_id: Option<String>,
    requester_login: Option<String>,
    channel_id: Option<String>,
    created_at: Option<String>,
    requester_message: Option<String>,
    requester_profile_image: Option<String>,
    resolver_id: Option<String>,
    resolver_login: Option<String>,
    resolver_message: Option<String>,
    status: Option<String>,
}
