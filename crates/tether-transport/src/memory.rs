//! In-process transport backed by tokio mpsc channels.
//!
//! [`MemoryConnector`] hands out client connections; every successful
//! connect produces a [`MemoryPeer`] on the paired [`MemoryServer`], which
//! plays the remote side: it pushes fragments, closes, severs, and reads
//! what the client sent. No serialization, no IO. Useful for testing the
//! framer, the lifecycle engine, and protocol adapters without networking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, Connector, Received, TransportError};

/// What the peer pushes towards the client.
#[derive(Debug)]
enum ToClient {
    Unit(Received),
    Sever,
    Fail(String),
}

/// What the client pushes towards the peer.
#[derive(Debug)]
enum ToPeer {
    Text(String),
    Close,
}

/// State shared between a connector and its server.
#[derive(Debug)]
struct Shared {
    refusing: AtomicBool,
    attempts: AtomicU64,
    next_id: AtomicU64,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Creates a connected connector/server pair.
pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        refusing: AtomicBool::new(false),
        attempts: AtomicU64::new(0),
        next_id: AtomicU64::new(1),
        accepted: accepted_tx,
    });
    (
        MemoryConnector {
            shared: Arc::clone(&shared),
        },
        MemoryServer {
            shared,
            accepted: accepted_rx,
        },
    )
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Client half: a [`Connector`] that dials the paired [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, uri: &str) -> Result<Self::Connection, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{uri} refused the connection"),
            )));
        }

        let id = ConnectionId::new(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let hang_on_close = Arc::new(AtomicBool::new(false));

        let peer = MemoryPeer {
            id,
            uri: uri.to_string(),
            tx: to_client_tx,
            rx: to_peer_rx,
            fail_sends: Arc::clone(&fail_sends),
            hang_on_close: Arc::clone(&hang_on_close),
            client_closed: false,
            closed_gracefully: false,
        };
        self.shared.accepted.send(peer).map_err(|_| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "memory server dropped",
            ))
        })?;

        Ok(MemoryConnection {
            id,
            rx: Mutex::new(to_client_rx),
            tx: to_peer_tx,
            fail_sends,
            hang_on_close,
            closed: AtomicBool::new(false),
        })
    }
}

/// A client connection produced by [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    rx: Mutex<mpsc::UnboundedReceiver<ToClient>>,
    tx: mpsc::UnboundedSender<ToPeer>,
    fail_sends: Arc<AtomicBool>,
    hang_on_close: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl Connection for MemoryConnection {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(std::io::Error::other(
                "injected send failure",
            )));
        }
        self.tx
            .send(ToPeer::Text(text.to_string()))
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        match self.rx.lock().await.recv().await {
            Some(ToClient::Unit(unit)) => Ok(unit),
            Some(ToClient::Sever) | None => {
                Err(TransportError::ConnectionClosed("peer dropped".into()))
            }
            Some(ToClient::Fail(reason)) => Err(TransportError::ReceiveFailed(
                std::io::Error::new(std::io::ErrorKind::InvalidData, reason),
            )),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.hang_on_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        // The peer may already be gone; closing is still a success.
        let _ = self.tx.send(ToPeer::Close);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Server half: yields one [`MemoryPeer`] per accepted connection.
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Makes subsequent connects fail (`true`) or succeed (`false`).
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Total number of connect attempts, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// The remote end of one [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryPeer {
    id: ConnectionId,
    uri: String,
    tx: mpsc::UnboundedSender<ToClient>,
    rx: mpsc::UnboundedReceiver<ToPeer>,
    fail_sends: Arc<AtomicBool>,
    hang_on_close: Arc<AtomicBool>,
    client_closed: bool,
    closed_gracefully: bool,
}

impl MemoryPeer {
    /// The id of the client connection this peer serves.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The URI the client dialed.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Pushes a complete text unit to the client.
    pub fn send_text(&self, text: &str) {
        self.push(ToClient::Unit(Received::whole(text)));
    }

    /// Pushes one fragment; the client sees a complete unit only once a
    /// fragment with `end_of_message` arrives.
    pub fn send_fragment(&self, data: &[u8], end_of_message: bool) {
        self.push(ToClient::Unit(Received::Fragment {
            data: data.to_vec(),
            end_of_message,
        }));
    }

    /// Sends a close handshake to the client.
    pub fn close(&self) {
        self.push(ToClient::Unit(Received::Close));
    }

    /// Drops the connection without a close handshake.
    pub fn sever(&self) {
        self.push(ToClient::Sever);
    }

    /// Makes the client's next `recv` fail with a non-severance error.
    pub fn fail(&self, reason: &str) {
        self.push(ToClient::Fail(reason.to_string()));
    }

    /// Makes every client `send` fail from now on.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Makes the client's `close` never complete, like a half-dead socket
    /// that never acknowledges the close handshake.
    pub fn hang_on_close(&self) {
        self.hang_on_close.store(true, Ordering::SeqCst);
    }

    /// Waits for the next text the client sent.
    ///
    /// Returns `None` once the client closed or dropped the connection.
    pub async fn recv(&mut self) -> Option<String> {
        if self.client_closed {
            return None;
        }
        match self.rx.recv().await {
            Some(ToPeer::Text(text)) => Some(text),
            Some(ToPeer::Close) => {
                self.client_closed = true;
                self.closed_gracefully = true;
                None
            }
            None => {
                self.client_closed = true;
                None
            }
        }
    }

    /// Returns everything the client has sent so far without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while !self.client_closed {
            match self.rx.try_recv() {
                Ok(ToPeer::Text(text)) => out.push(text),
                Ok(ToPeer::Close) => {
                    self.client_closed = true;
                    self.closed_gracefully = true;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.client_closed = true,
            }
        }
        out
    }

    /// Whether the client performed a close handshake (or dropped).
    ///
    /// Only reflects what has been read through [`recv`](Self::recv) or
    /// [`drain`](Self::drain).
    pub fn client_closed(&self) -> bool {
        self.client_closed
    }

    /// Whether the client ended the connection with a close handshake, as
    /// opposed to dropping it.
    ///
    /// Same caveat as [`client_closed`](Self::client_closed).
    pub fn closed_gracefully(&self) -> bool {
        self.closed_gracefully
    }

    fn push(&self, msg: ToClient) {
        if self.tx.send(msg).is_err() {
            tracing::trace!(id = %self.id, "memory client already dropped");
        }
    }
}
