//! `low-trust-users` payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{User, envelope};

/// A user's low-trust treatment in a channel changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentUpdate {
    /// `<channel id>.<target id>`
    pub low_trust_id: String,
    pub channel_id: String,
    pub updated_by: User,
    pub updated_at: DateTime<Utc>,
    pub target_user_id: String,
    /// Login of the treated user.
    pub target_user: String,
    /// e.g. `ACTIVE_MONITORING`, `RESTRICTED`, `NO_TREATMENT`.
    pub treatment: String,
    #[serde(default)]
    pub types: Vec<String>,
    pub ban_evasion_evaluation: String,
    pub evaluated_at: DateTime<Utc>,
}

impl TreatmentUpdate {
    const TYPE: &'static str = "low_trust_user_treatment_update";

    /// Decodes the inner message of a `low-trust-users` envelope.
    pub fn from_message(message: &Value) -> Option<Self> {
        match envelope(message)? {
            (Self::TYPE, data) => Self::deserialize(data).ok(),
            _ => None,
        }
    }
}
