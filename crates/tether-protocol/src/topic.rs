//! Pub/sub topic names.
//!
//! A topic is a dotted string: the topic name followed by its arguments,
//! e.g. `chat_moderator_actions.<user id>.<channel id>` or
//! `shoutout.<channel id>`.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// A topic a pub/sub client can listen to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Moderator actions in a channel, as seen by `user_id`.
    ChatModeratorActions { user_id: String, channel_id: String },
    /// Unban requests filed in a channel, as seen by `user_id`.
    ChannelUnbanRequests { user_id: String, channel_id: String },
    /// Shoutouts given in a channel.
    Shoutout { channel_id: String },
    /// Low-trust treatment changes in a channel, as seen by `user_id`.
    LowTrustUsers { user_id: String, channel_id: String },
}

impl Topic {
    pub const CHAT_MODERATOR_ACTIONS: &'static str = "chat_moderator_actions";
    pub const CHANNEL_UNBAN_REQUESTS: &'static str = "channel-unban-requests";
    pub const SHOUTOUT: &'static str = "shoutout";
    pub const LOW_TRUST_USERS: &'static str = "low-trust-users";

    /// The topic name without arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatModeratorActions { .. } => Self::CHAT_MODERATOR_ACTIONS,
            Self::ChannelUnbanRequests { .. } => Self::CHANNEL_UNBAN_REQUESTS,
            Self::Shoutout { .. } => Self::SHOUTOUT,
            Self::LowTrustUsers { .. } => Self::LOW_TRUST_USERS,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatModeratorActions {
                user_id,
                channel_id,
            }
            | Self::ChannelUnbanRequests {
                user_id,
                channel_id,
            }
            | Self::LowTrustUsers {
                user_id,
                channel_id,
            } => write!(f, "{}.{user_id}.{channel_id}", self.name()),
            Self::Shoutout { channel_id } => write!(f, "{}.{channel_id}", self.name()),
        }
    }
}

impl FromStr for Topic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [Self::CHAT_MODERATOR_ACTIONS, user_id, channel_id] => Ok(Self::ChatModeratorActions {
                user_id: (*user_id).to_string(),
                channel_id: (*channel_id).to_string(),
            }),
            [Self::CHANNEL_UNBAN_REQUESTS, user_id, channel_id] => Ok(Self::ChannelUnbanRequests {
                user_id: (*user_id).to_string(),
                channel_id: (*channel_id).to_string(),
            }),
            [Self::SHOUTOUT, channel_id] => Ok(Self::Shoutout {
                channel_id: (*channel_id).to_string(),
            }),
            [Self::LOW_TRUST_USERS, user_id, channel_id] => Ok(Self::LowTrustUsers {
                user_id: (*user_id).to_string(),
                channel_id: (*channel_id).to_string(),
            }),
            _ => Err(ProtocolError::InvalidTopic(s.to_string())),
        }
    }
}
