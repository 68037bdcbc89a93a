//! `chat_moderator_actions` payloads.
//!
//! Two payload families share this topic. `moderation_action` messages
//! carry the classic chat commands (`ban`, `timeout`, `slow`, ...) with
//! positional `args`. Everything else (mod/VIP changes, unban request
//! resolutions, blocked and permitted terms) uses its own `type` and named
//! fields.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{User, envelope, non_empty, timestamp};

/// A moderator action in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorAction {
    /// Wire name of the action, e.g. `ban`, `mod` or `add_blocked_term`.
    pub action: String,
    /// Who performed it. For `raid` and `unraid` the login holds the
    /// initiator's display name.
    pub initiator: User,
    pub kind: ActionKind,
}

/// What a [`ModeratorAction`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    Ban {
        target: User,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    },
    Unban {
        target: User,
        created_at: DateTime<Utc>,
    },
    Timeout {
        target: User,
        duration: Duration,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    },
    Untimeout {
        target: User,
        created_at: DateTime<Utc>,
    },
    Warn {
        target: User,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    },
    AcknowledgeWarning {
        target: User,
        created_at: DateTime<Utc>,
    },
    /// A single chat message was deleted.
    Delete {
        target: User,
        message_id: String,
        message: String,
        created_at: DateTime<Utc>,
    },
    Clear,
    EmoteOnly,
    EmoteOnlyOff,
    /// Followers-only mode; chatters must have followed for `min_age`.
    Followers {
        min_age: Duration,
    },
    FollowersOff,
    Slow {
        interval: Duration,
    },
    SlowOff,
    Subscribers,
    SubscribersOff,
    R9kBeta,
    R9kBetaOff,
    Raid {
        target_display_name: String,
    },
    Unraid,
    Mod {
        target: User,
        channel_id: String,
    },
    Unmod {
        target: User,
        channel_id: String,
    },
    Vip {
        target: User,
        channel_id: String,
    },
    ApproveUnbanRequest {
        target: User,
        moderator_message: Option<String>,
    },
    DenyUnbanRequest {
        target: User,
        moderator_message: Option<String>,
    },
    AddBlockedTerm(Term),
    DeleteBlockedTerm(Term),
    AddPermittedTerm(Term),
    DeletePermittedTerm(Term),
}

impl ActionKind {
    /// The user the action was aimed at, if any.
    pub fn target(&self) -> Option<&User> {
        match self {
            Self::Ban { target, .. }
            | Self::Unban { target, .. }
            | Self::Timeout { target, .. }
            | Self::Untimeout { target, .. }
            | Self::Warn { target, .. }
            | Self::AcknowledgeWarning { target, .. }
            | Self::Delete { target, .. }
            | Self::Mod { target, .. }
            | Self::Unmod { target, .. }
            | Self::Vip { target, .. }
            | Self::ApproveUnbanRequest { target, .. }
            | Self::DenyUnbanRequest { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// A blocked or permitted chat term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: String,
    pub text: String,
    pub channel_id: String,
    pub updated_at: DateTime<Utc>,
}

impl ModeratorAction {
    /// Decodes the inner message of a `chat_moderator_actions` envelope.
    pub fn from_message(message: &Value) -> Option<Self> {
        let (kind, data) = envelope(message)?;
        let raw = RawAction::deserialize(data).ok()?;
        match kind {
            "moderation_action" => raw.into_chat_command(),
            "channel_terms_action" => raw.into_term_action(),
            other => raw.into_channel_action(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// Union of every field any action payload uses.
#[derive(Debug, Deserialize)]
struct RawAction {
    moderation_action: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    args: Option<Vec<String>>,
    created_at: Option<String>,
    created_by: Option<String>,
    created_by_user_id: Option<String>,
    created_by_id: Option<String>,
    created_by_login: Option<String>,
    target_user_id: Option<String>,
    target_user_login: Option<String>,
    moderator_message: Option<String>,
    channel_id: Option<String>,
    id: Option<String>,
    text: Option<String>,
    requester_id: Option<String>,
    requester_login: Option<String>,
    updated_at: Option<String>,
}

impl RawAction {
    fn target(&self) -> Option<User> {
        Some(User::new(
            self.target_user_id.clone()?,
            self.target_user_login.clone()?,
        ))
    }

    /// `moderation_action` payloads: the command name plus positional args.
    fn into_chat_command(self) -> Option<ModeratorAction> {
        let target = self.target();
        let created_at = timestamp(self.created_at.as_deref());
        let action = self.moderation_action?;
        let initiator = User::new(self.created_by_user_id?, self.created_by?);
        let mut args = self.args.unwrap_or_default();

        let kind = match action.as_str() {
            "ban" if args.len() == 2 => ActionKind::Ban {
                target: target?,
                reason: args.pop().and_then(non_empty),
                created_at: created_at?,
            },
            "unban" => ActionKind::Unban {
                target: target?,
                created_at: created_at?,
            },
            "timeout" if args.len() == 3 => ActionKind::Timeout {
                target: target?,
                duration: Duration::from_secs(args[1].parse().ok()?),
                reason: args.pop().and_then(non_empty),
                created_at: created_at?,
            },
            "untimeout" => ActionKind::Untimeout {
                target: target?,
                created_at: created_at?,
            },
            "warn" if args.len() == 2 => ActionKind::Warn {
                target: target?,
                reason: args.pop().and_then(non_empty),
                created_at: created_at?,
            },
            "acknowledge_warning" => ActionKind::AcknowledgeWarning {
                target: target?,
                created_at: created_at?,
            },
            // args: [login, message, message id]
            "delete" if args.len() == 3 => {
                let message_id = args.pop()?;
                let message = args.pop()?;
                let login = args.pop()?;
                ActionKind::Delete {
                    target: User::new(self.target_user_id?, login),
                    message_id,
                    message,
                    created_at: created_at?,
                }
            }
            "clear" => ActionKind::Clear,
            "emoteonly" => ActionKind::EmoteOnly,
            "emoteonlyoff" => ActionKind::EmoteOnlyOff,
            "followers" if args.len() == 1 => ActionKind::Followers {
                min_age: Duration::from_secs(args[0].parse::<u64>().ok()?.checked_mul(60)?),
            },
            "followersoff" => ActionKind::FollowersOff,
            "slow" if args.len() == 1 => ActionKind::Slow {
                interval: Duration::from_secs(args[0].parse().ok()?),
            },
            "slowoff" => ActionKind::SlowOff,
            "subscribers" => ActionKind::Subscribers,
            "subscribersoff" => ActionKind::SubscribersOff,
            "r9kbeta" => ActionKind::R9kBeta,
            "r9kbetaoff" => ActionKind::R9kBetaOff,
            "raid" if args.len() == 1 => ActionKind::Raid {
                target_display_name: args.pop()?,
            },
            "unraid" => ActionKind::Unraid,
            _ => return None,
        };

        Some(ModeratorAction {
            action,
            initiator,
            kind,
        })
    }

    /// Payloads identified by their own `type`: mod/VIP changes and unban
    /// request resolutions.
    fn into_channel_action(self, kind: &str) -> Option<ModeratorAction> {
        let target = self.target()?;
        let (action, initiator, kind) = match kind {
            "approve_unban_request" | "deny_unban_request" => {
                let initiator = User::new(self.created_by_id?, self.created_by_login?);
                let moderator_message = non_empty(self.moderator_message?);
                let action = if kind == "approve_unban_request" {
                    ActionKind::ApproveUnbanRequest {
                        target,
                        moderator_message,
                    }
                } else {
                    ActionKind::DenyUnbanRequest {
                        target,
                        moderator_message,
                    }
                };
                (kind.to_string(), initiator, action)
            }
            "moderator_added" | "moderator_removed" => {
                let initiator = User::new(self.created_by_user_id?, self.created_by?);
                let channel_id = self.channel_id?;
                let action = if kind == "moderator_added" {
                    ActionKind::Mod { target, channel_id }
                } else {
                    ActionKind::Unmod { target, channel_id }
                };
                (self.moderation_action?, initiator, action)
            }
            "vip_added" => {
                let initiator = User::new(self.created_by_user_id?, self.created_by?);
                let channel_id = self.channel_id?;
                (kind.to_string(), initiator, ActionKind::Vip { target, channel_id })
            }
            _ => return None,
        };

        Some(ModeratorAction {
            action,
            initiator,
            kind,
        })
    }

    /// `channel_terms_action`: the term operation is in `data.type`.
    fn into_term_action(self) -> Option<ModeratorAction> {
        let term = Term {
            id: self.id?,
            text: self.text?,
            channel_id: self.channel_id?,
            updated_at: timestamp(self.updated_at.as_deref())?,
        };
        let initiator = User::new(self.requester_id?, self.requester_login?);
        let action = self.kind?;
        let kind = match action.as_str() {
            "add_blocked_term" => ActionKind::AddBlockedTerm(term),
            "delete_blocked_term" => ActionKind::DeleteBlockedTerm(term),
            "add_permitted_term" => ActionKind::AddPermittedTerm(term),
            "delete_permitted_term" => ActionKind::DeletePermittedTerm(term),
            _ => return None,
        };

        Some(ModeratorAction {
            action,
            initiator,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 0).unwrap()
    }

    /// A `moderation_action` message as the server sends it.
    fn chat_command(action: &str, args: Value, target: bool) -> Value {
        let mut data = json!({
            "type": "chat_login_moderation",
            "moderation_action": action,
            "args": args,
            "created_by": "mod_login",
            "created_by_user_id": "100",
            "msg_id": "",
            "target_user_id": "",
            "target_user_login": "",
            "created_at": "2024-02-01T12:30:00.123456789Z",
            "from_automod": false
        });
        if target {
            data["target_user_id"] = json!("200");
            data["target_user_login"] = json!("target_login");
        } else {
            data["target_user_id"] = Value::Null;
            data["target_user_login"] = Value::Null;
        }
        json!({ "type": "moderation_action", "data": data })
    }

    fn decode(message: &Value) -> ModeratorAction {
        ModeratorAction::from_message(message).expect("payload should decode")
    }

    fn mod_user() -> User {
        User::new("100", "mod_login")
    }

    fn target_user() -> User {
        User::new("200", "target_login")
    }

    #[test]
    fn test_ban_with_reason() {
        let action = decode(&chat_command("ban", json!(["target_login", "spam"]), true));
        assert_eq!(action.action, "ban");
        assert_eq!(action.initiator, mod_user());
        let ActionKind::Ban {
            target,
            reason,
            created_at: at,
        } = action.kind
        else {
            panic!("expected ban, got {:?}", action.kind);
        };
        assert_eq!(target, target_user());
        assert_eq!(reason.as_deref(), Some("spam"));
        assert_eq!(at.timestamp(), created_at().timestamp());
    }

    #[test]
    fn test_ban_with_empty_reason_has_none() {
        let action = decode(&chat_command("ban", json!(["target_login", ""]), true));
        assert!(matches!(action.kind, ActionKind::Ban { reason: None, .. }));
    }

    #[test]
    fn test_ban_without_target_is_rejected() {
        let message = chat_command("ban", json!(["target_login", "spam"]), false);
        assert_eq!(ModeratorAction::from_message(&message), None);
    }

    #[test]
    fn test_timeout_parses_duration_and_reason() {
        let action = decode(&chat_command(
            "timeout",
            json!(["target_login", "600", "calm down"]),
            true,
        ));
        assert_eq!(action.kind.target(), Some(&target_user()));
        match action.kind {
            ActionKind::Timeout {
                duration, reason, ..
            } => {
                assert_eq!(duration, Duration::from_secs(600));
                assert_eq!(reason.as_deref(), Some("calm down"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_with_non_numeric_duration_is_rejected() {
        let message = chat_command("timeout", json!(["target_login", "soon", ""]), true);
        assert_eq!(ModeratorAction::from_message(&message), None);
    }

    #[test]
    fn test_unban_untimeout_warn_and_acknowledge() {
        let unban = decode(&chat_command("unban", json!(["target_login"]), true));
        assert!(matches!(unban.kind, ActionKind::Unban { .. }));

        let untimeout = decode(&chat_command("untimeout", json!(["target_login"]), true));
        assert!(matches!(untimeout.kind, ActionKind::Untimeout { .. }));

        let warn = decode(&chat_command("warn", json!(["target_login", "be nice"]), true));
        assert!(matches!(
            warn.kind,
            ActionKind::Warn { ref reason, .. } if reason.as_deref() == Some("be nice")
        ));

        let ack = decode(&chat_command("acknowledge_warning", json!([]), true));
        assert_eq!(ack.kind.target(), Some(&target_user()));
    }

    #[test]
    fn test_delete_takes_login_and_message_from_args() {
        let mut message = chat_command(
            "delete",
            json!(["target_login", "bad words", "0a1b2c"]),
            true,
        );
        message["data"]["target_user_login"] = json!("");
        let action = decode(&message);
        assert_eq!(
            action.kind,
            ActionKind::Delete {
                target: target_user(),
                message_id: "0a1b2c".into(),
                message: "bad words".into(),
                created_at: timestamp(Some("2024-02-01T12:30:00.123456789Z")).unwrap(),
            }
        );
    }

    #[test]
    fn test_chat_modes() {
        let cases = [
            ("clear", ActionKind::Clear),
            ("emoteonly", ActionKind::EmoteOnly),
            ("emoteonlyoff", ActionKind::EmoteOnlyOff),
            ("followersoff", ActionKind::FollowersOff),
            ("slowoff", ActionKind::SlowOff),
            ("subscribers", ActionKind::Subscribers),
            ("subscribersoff", ActionKind::SubscribersOff),
            ("r9kbeta", ActionKind::R9kBeta),
            ("r9kbetaoff", ActionKind::R9kBetaOff),
            ("unraid", ActionKind::Unraid),
        ];
        for (name, expected) in cases {
            let action = decode(&chat_command(name, Value::Null, false));
            assert_eq!(action.action, name);
            assert_eq!(action.initiator, mod_user());
            assert_eq!(action.kind, expected, "action {name}");
        }
    }

    #[test]
    fn test_followers_is_minutes_and_slow_is_seconds() {
        let followers = decode(&chat_command("followers", json!(["10"]), false));
        assert_eq!(
            followers.kind,
            ActionKind::Followers {
                min_age: Duration::from_secs(600)
            }
        );

        let slow = decode(&chat_command("slow", json!(["30"]), false));
        assert_eq!(
            slow.kind,
            ActionKind::Slow {
                interval: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_raid_target_is_a_display_name() {
        let action = decode(&chat_command("raid", json!(["OtherChannel"]), false));
        assert_eq!(
            action.kind,
            ActionKind::Raid {
                target_display_name: "OtherChannel".into()
            }
        );
    }

    #[test]
    fn test_unknown_chat_command_is_rejected() {
        let message = chat_command("automod_rejected", json!([]), true);
        assert_eq!(ModeratorAction::from_message(&message), None);
    }

    #[test]
    fn test_moderator_added_and_removed() {
        let added = json!({
            "type": "moderator_added",
            "data": {
                "channel_id": "300",
                "target_user_id": "200",
                "target_user_login": "target_login",
                "moderation_action": "mod",
                "created_by_user_id": "100",
                "created_by": "mod_login"
            }
        });
        let action = decode(&added);
        assert_eq!(action.action, "mod");
        assert_eq!(
            action.kind,
            ActionKind::Mod {
                target: target_user(),
                channel_id: "300".into()
            }
        );

        let mut removed = added.clone();
        removed["type"] = json!("moderator_removed");
        removed["data"]["moderation_action"] = json!("unmod");
        let action = decode(&removed);
        assert_eq!(action.action, "unmod");
        assert!(matches!(action.kind, ActionKind::Unmod { .. }));
    }

    #[test]
    fn test_vip_added() {
        let message = json!({
            "type": "vip_added",
            "data": {
                "channel_id": "300",
                "target_user_id": "200",
                "target_user_login": "target_login",
                "created_by_user_id": "100",
                "created_by": "mod_login"
            }
        });
        let action = decode(&message);
        assert_eq!(action.action, "vip_added");
        assert_eq!(action.initiator, mod_user());
        assert!(matches!(action.kind, ActionKind::Vip { .. }));
    }

    #[test]
    fn test_unban_request_resolutions() {
        let approve = json!({
            "type": "approve_unban_request",
            "data": {
                "moderation_action": "APPROVE_UNBAN_REQUEST",
                "created_by_id": "100",
                "created_by_login": "mod_login",
                "moderator_message": "welcome back",
                "target_user_id": "200",
                "target_user_login": "target_login"
            }
        });
        let action = decode(&approve);
        assert_eq!(action.action, "approve_unban_request");
        assert_eq!(action.initiator, mod_user());
        assert_eq!(
            action.kind,
            ActionKind::ApproveUnbanRequest {
                target: target_user(),
                moderator_message: Some("welcome back".into()),
            }
        );

        let mut deny = approve.clone();
        deny["type"] = json!("deny_unban_request");
        deny["data"]["moderator_message"] = json!("");
        assert_eq!(
            decode(&deny).kind,
            ActionKind::DenyUnbanRequest {
                target: target_user(),
                moderator_message: None,
            }
        );
    }

    #[test]
    fn test_term_actions() {
        let message = json!({
            "type": "channel_terms_action",
            "data": {
                "type": "add_blocked_term",
                "id": "term-1",
                "text": "badword",
                "requester_id": "100",
                "requester_login": "mod_login",
                "channel_id": "300",
                "expires_at": "",
                "updated_at": "2024-02-01T12:30:00Z",
                "from_automod": false
            }
        });
        let term = Term {
            id: "term-1".into(),
            text: "badword".into(),
            channel_id: "300".into(),
            updated_at: created_at(),
        };
        let action = decode(&message);
        assert_eq!(action.action, "add_blocked_term");
        assert_eq!(action.initiator, mod_user());
        assert_eq!(action.kind, ActionKind::AddBlockedTerm(term.clone()));
        assert_eq!(action.kind.target(), None);

        for (name, expected) in [
            ("delete_blocked_term", ActionKind::DeleteBlockedTerm(term.clone())),
            ("add_permitted_term", ActionKind::AddPermittedTerm(term.clone())),
            ("delete_permitted_term", ActionKind::DeletePermittedTerm(term)),
        ] {
            let mut message = message.clone();
            message["data"]["type"] = json!(name);
            let action = decode(&message);
            assert_eq!(action.action, name);
            assert_eq!(action.kind, expected);
        }
    }

    #[test]
    fn test_term_action_without_timestamp_is_rejected() {
        let message = json!({
            "type": "channel_terms_action",
            "data": {
                "type": "add_blocked_term",
                "id": "term-1",
                "text": "badword",
                "requester_id": "100",
                "requester_login": "mod_login",
                "channel_id": "300"
            }
        });
        assert_eq!(ModeratorAction::from_message(&message), None);
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let action = decode(&chat_command("slow", json!(["5"]), false));
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "slow");
        assert_eq!(value["kind"]["kind"], "slow");
        assert_eq!(value["initiator"]["login"], "mod_login");
    }
}
