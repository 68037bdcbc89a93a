//! `shoutout` payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope;

/// A channel gave another channel a shoutout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shoutout {
    /// Inner message type, `create` for a new shoutout.
    pub kind: String,
    pub broadcaster_user_id: String,
    pub target_user_id: String,
    pub target_login: String,
    pub target_user_display_name: String,
    /// URL template; `%s` stands for the image size.
    pub target_user_profile_image_url: String,
    pub target_user_cta_info: String,
    pub target_user_primary_color_hex: String,
    pub source_user_id: String,
    pub source_login: String,
    pub shoutout_id: String,
}

impl Shoutout {
    /// Decodes the inner message of a `shoutout` envelope.
    pub fn from_message(message: &Value) -> Option<Self> {
        let (kind, data) = envelope(message)?;
        let raw = RawShoutout::deserialize(data).ok()?;
        Some(Self {
            kind: kind.to_string(),
            broadcaster_user_id: raw.broadcaster_user_id,
            target_user_id: raw.target_user_id,
            target_login: raw.target_login,
            target_user_display_name: raw.target_user_display_name,
            target_user_profile_image_url: raw.target_user_profile_image_url,
            target_user_cta_info: raw.target_user_cta_info,
            target_user_primary_color_hex: raw.target_user_primary_color_hex,
            source_user_id: raw.source_user_id,
            source_login: raw.source_login,
            shoutout_id: raw.shoutout_id,
        })
    }
}

/// The wire spelling keeps the `ID`/`URL`/`CTA` acronyms upper case.
#[derive(Debug, Deserialize)]
struct RawShoutout {
    #[serde(rename = "broadcasterUserID")]
    broadcaster_user_id: String,
    #[serde(rename = "targetUserID")]
    target_user_id: String,
    #[serde(rename = "targetLogin")]
    target_login: String,
    #[serde(rename = "targetUserDisplayName")]
    target_user_display_name: String,
    #[serde(rename = "targetUserProfileImageURL")]
    target_user_profile_image_url: String,
    #[serde(rename = "targetUserCTAInfo", default)]
    target_user_cta_info: String,
    #[serde(rename = "targetUserPrimaryColorHex", default)]
    target_user_primary_color_hex: String,
    #[serde(rename = "sourceUserID")]
    source_user_id: String,
    #[serde(rename = "sourceLogin")]
    source_login: String,
    #[serde(rename = "shoutoutID")]
    shoutout_id: String,
}
