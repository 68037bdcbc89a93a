//! Error types for the protocol layer.
//!
//! Each crate in Tether defines its own error enum. A `ProtocolError`
//! always means a payload could not be mapped to or from its typed form;
//! it never means the connection itself is in trouble.

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a typed message into text).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON or a missing field.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The text parsed but violates the protocol grammar, e.g. an IRC line
    /// without a command.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A pub/sub topic string did not match any known topic.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}
