//! JSON envelope codec for the pub/sub protocol.
//!
//! Every frame is one JSON object with a `type` field. Clients send
//! `PING`, `LISTEN` and `UNLISTEN`; the server answers with `PONG`,
//! `RESPONSE` (correlated by `nonce`), `MESSAGE` and `RECONNECT`:
//!
//! ```json
//! {"type":"LISTEN","nonce":"9a1f...","data":{"topics":["chat_moderator_actions.1.2"],"auth_token":"..."}}
//! {"type":"MESSAGE","data":{"topic":"chat_moderator_actions.1.2","message":"{\"type\":\"moderation_action\"}"}}
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Codec, ProtocolError};

/// The `type` discriminator of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadType {
    Ping,
    Pong,
    Listen,
    Unlisten,
    Response,
    Message,
    Reconnect,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Arguments of a `LISTEN` / `UNLISTEN` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth_token: Option<String>,
}

/// An envelope sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: PayloadType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<RequestData>,
}

impl Request {
    /// `{"type":"PING"}`
    pub fn ping() -> Self {
        Self {
            kind: PayloadType::Ping,
            nonce: None,
            data: None,
        }
    }

    /// Subscribes to `topics`, authorized by `auth_token`.
    pub fn listen(topics: Vec<String>, auth_token: impl Into<String>, nonce: Option<String>) -> Self {
        Self {
            kind: PayloadType::Listen,
            nonce,
            data: Some(RequestData {
                topics,
                auth_token: Some(auth_token.into()),
            }),
        }
    }

    /// Unsubscribes from `topics`.
    pub fn unlisten(topics: Vec<String>, nonce: Option<String>) -> Self {
        Self {
            kind: PayloadType::Unlisten,
            nonce,
            data: Some(RequestData {
                topics,
                auth_token: None,
            }),
        }
    }
}

/// Generates a random request nonce: 16 random bytes as lowercase hex.
pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// An envelope received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Pong,
    Reconnect,
    /// Result of a `LISTEN` / `UNLISTEN`; `error` is empty on success.
    Response { error: String, nonce: Option<String> },
    /// A message published on `topic`. `message` is the decoded inner JSON,
    /// or a JSON string when the inner text is not JSON.
    Message { topic: String, message: Value },
    /// Any other well-formed envelope.
    Unknown(Value),
}

impl Incoming {
    /// Decodes an already parsed envelope.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if a known envelope type is
    /// missing a required field.
    pub fn from_value(root: &Value) -> Result<Self, ProtocolError> {
        let kind = root
            .get("type")
            .cloned()
            .and_then(|t| serde_json::from_value::<PayloadType>(t).ok());

        match kind {
            Some(PayloadType::Pong) => Ok(Self::Pong),
            Some(PayloadType::Reconnect) => Ok(Self::Reconnect),
            Some(PayloadType::Response) => Ok(Self::Response {
                error: root
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                nonce: root.get("nonce").and_then(Value::as_str).map(str::to_owned),
            }),
            Some(PayloadType::Message) => {
                let data = root
                    .get("data")
                    .ok_or_else(|| missing_field("data"))?;
                let topic = data
                    .get("topic")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing_field("data.topic"))?;
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing_field("data.message"))?;
                Ok(Self::Message {
                    topic: topic.to_string(),
                    message: serde_json::from_str(message)
                        .unwrap_or_else(|_| Value::String(message.to_string())),
                })
            }
            _ => Ok(Self::Unknown(root.clone())),
        }
    }
}

fn missing_field(field: &str) -> ProtocolError {
    ProtocolError::InvalidMessage(format!("MESSAGE payload without {field}"))
}

// ---------------------------------------------------------------------------
// PubSubCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] for pub/sub envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PubSubCodec;

impl Codec for PubSubCodec {
    type Inbound = Incoming;
    type Outbound = Request;

    fn parse(&self, raw: &str) -> Result<Incoming, ProtocolError> {
        let root: Value = serde_json::from_str(raw).map_err(ProtocolError::Decode)?;
        Incoming::from_value(&root)
    }

    fn serialize(&self, message: &Request) -> Result<String, ProtocolError> {
        serde_json::to_string(message).map_err(ProtocolError::Encode)
    }
}
