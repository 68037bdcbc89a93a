use std::io::ErrorKind;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote end severed the connection.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Establishing the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The connection was already closed locally.
    #[error("not connected")]
    NotConnected,
}

impl TransportError {
    /// Returns `true` if this error means the remote side went away.
    ///
    /// The framer reports these as a plain closure rather than a fault,
    /// so the engine treats an abrupt network loss like a close frame.
    pub fn is_severed(&self) -> bool {
        match self {
            Self::ConnectionClosed(_) => true,
            Self::SendFailed(e) | Self::ReceiveFailed(e) => is_severed_kind(e.kind()),
            Self::ConnectFailed(_) | Self::NotConnected => false,
        }
    }
}

fn is_severed_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}
