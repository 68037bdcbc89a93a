//! The [`Codec`] trait: raw logical messages to typed messages and back.
//!
//! The framer hands out plain strings. A codec is the strategy that turns
//! one of those strings into a protocol type and turns outbound protocol
//! types into strings for the engine's queue. The engine never calls a
//! codec itself; protocol adapters do.

use crate::ProtocolError;

/// Converts between raw text messages and typed protocol messages.
///
/// Inbound and outbound types may differ: a pub/sub client sends
/// `Request`s but receives `Incoming` payloads.
pub trait Codec: Send + Sync + 'static {
    /// The typed form of a received message.
    type Inbound;
    /// The typed form of a message to send.
    type Outbound;

    /// Parses one logical message.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] when `raw` is not a valid message.
    fn parse(&self, raw: &str) -> Result<Self::Inbound, ProtocolError>;

    /// Serializes one outbound message into its wire text.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the message cannot be encoded.
    fn serialize(&self, message: &Self::Outbound) -> Result<String, ProtocolError>;
}
