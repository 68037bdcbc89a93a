//! WebSocket client transport using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::{Connection, ConnectionId, Connector, Received, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`Connector`] that dials WebSocket endpoints (`ws://`, and `wss://`
/// with the `tls` feature).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a new connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(&self, uri: &str) -> Result<Self::Connection, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(uri)
            .await
            .map_err(|e| TransportError::ConnectFailed(std::io::Error::other(e)))?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        debug!(%id, uri, "WebSocket connected");

        // Sink and stream get separate locks so a pending read never
        // holds up an outbound write.
        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single client-side WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        // A text message sent through the sink is always written as one
        // frame with FIN set.
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(send_error)
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Received::whole(text.as_bytes()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Received::whole(data.to_vec()));
                }
                Some(Ok(Message::Close(_))) => {
                    // Tungstenite queues the close reply; flush it so the
                    // handshake completes without waiting for `close()`.
                    match self.sink.lock().await.flush().await {
                        Ok(())
                        | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
                        Err(e) => debug!(id = %self.id, error = %e, "close reply not flushed"),
                    }
                    return Ok(Received::Close);
                }
                None => return Ok(Received::Close),
                Some(Ok(_)) => continue, // skip ping/pong/raw frame
                Some(Err(e)) => return Err(receive_error(e)),
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.sink.lock().await.close().await {
            Ok(()) => Ok(()),
            // Closing an already closed socket is not a failure.
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(send_error(e)),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

fn is_severed(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

fn receive_error(e: tungstenite::Error) -> TransportError {
    match e {
        e if is_severed(&e) => TransportError::ConnectionClosed(e.to_string()),
        tungstenite::Error::Io(io) => TransportError::ReceiveFailed(io),
        e => TransportError::ReceiveFailed(std::io::Error::other(e)),
    }
}

fn send_error(e: tungstenite::Error) -> TransportError {
    match e {
        e if is_severed(&e) => TransportError::ConnectionClosed(e.to_string()),
        tungstenite::Error::Io(io) => TransportError::SendFailed(io),
        e => TransportError::SendFailed(std::io::Error::other(e)),
    }
}
