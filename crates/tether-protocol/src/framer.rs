//! The framer: turns a fragment-oriented connection into logical messages.
//!
//! The wire does not line up with protocol messages in either direction.
//! A chat gateway may pack several `\r\n`-terminated lines into one
//! WebSocket frame, and any transport may split one message across
//! fragments. The [`Framer`] accumulates fragments until the transport
//! marks the end of a unit, then applies its [`SplitPolicy`]:
//!
//! ```text
//! Fragment("PING :a\r\nPRIV")  ─┐
//! Fragment("MSG #c :hi\r\n", end) ─┴→ "PING :a", "PRIVMSG #c :hi"   (Lines)
//! Fragment("{\"type\":\"PONG\"}", end) → "{\"type\":\"PONG\"}"      (Whole)
//! ```
//!
//! Lines left over from a unit are queued and returned by later
//! [`Framer::receive_one`] calls without touching the connection.

use std::collections::VecDeque;
use std::sync::Arc;

use tether_transport::{Connection, Received, TransportError};

/// How a completed transport unit is cut into logical messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPolicy {
    /// One unit may carry many `\n` or `\r\n` terminated lines.
    #[default]
    Lines,
    /// One unit is exactly one message.
    Whole,
}

/// The outcome of one [`Framer::receive_one`] call.
#[derive(Debug)]
pub enum Inbound {
    /// A complete logical message. May be empty; callers skip those.
    Message(String),
    /// The remote side closed or severed the connection.
    Closed,
    /// A transport failure that is not a closure.
    Error(TransportError),
}

/// Reads logical messages from a connection and writes whole messages to it.
///
/// The framer owns the receive side. Use [`Framer::writer`] to hand the
/// send side to another task.
pub struct Framer<C> {
    conn: Arc<C>,
    policy: SplitPolicy,
    /// Bytes of the unit currently being assembled.
    partial: Vec<u8>,
    /// Lines already split off a completed unit.
    pending: VecDeque<String>,
}

impl<C: Connection> Framer<C> {
    /// Wraps a connection with the given split policy.
    pub fn new(conn: Arc<C>, policy: SplitPolicy) -> Self {
        Self {
            conn,
            policy,
            partial: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// The split policy this framer was built with.
    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    /// Returns a handle that writes to the same connection.
    pub fn writer(&self) -> FrameWriter<C> {
        FrameWriter {
            conn: Arc::clone(&self.conn),
        }
    }

    /// Returns the next logical message, reading the connection only when
    /// no split-off lines are queued.
    ///
    /// A closure in the middle of a unit discards the partial bytes. Under
    /// [`SplitPolicy::Lines`] a transport error that interrupts a unit is
    /// also reported as [`Inbound::Closed`], so truncated lines are never
    /// delivered.
    pub async fn receive_one(&mut self) -> Inbound {
        if let Some(line) = self.pending.pop_front() {
            return Inbound::Message(line);
        }

        loop {
            match self.conn.recv().await {
                Ok(Received::Fragment {
                    data,
                    end_of_message,
                }) => {
                    self.partial.extend_from_slice(&data);
                    if !end_of_message {
                        continue;
                    }
                    return self.complete_unit();
                }
                Ok(Received::Close) => {
                    self.partial.clear();
                    return Inbound::Closed;
                }
                Err(e) if e.is_severed() => {
                    tracing::debug!(error = %e, "connection severed");
                    self.partial.clear();
                    return Inbound::Closed;
                }
                Err(e) => {
                    let interrupted = !self.partial.is_empty();
                    self.partial.clear();
                    if interrupted && self.policy == SplitPolicy::Lines {
                        tracing::debug!(error = %e, "unit interrupted, treating as closed");
                        return Inbound::Closed;
                    }
                    return Inbound::Error(e);
                }
            }
        }
    }

    /// Sends one logical message as one complete transport unit.
    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.conn.send(text).await
    }

    fn complete_unit(&mut self) -> Inbound {
        let payload = std::mem::take(&mut self.partial);
        let text = String::from_utf8_lossy(&payload).into_owned();

        match self.policy {
            SplitPolicy::Whole => Inbound::Message(text),
            SplitPolicy::Lines => {
                self.pending.extend(text.lines().map(str::to_owned));
                tracing::trace!(lines = self.pending.len(), "unit split");
                // A unit with no lines at all still yields one (empty)
                // message so the caller sees progress.
                Inbound::Message(self.pending.pop_front().unwrap_or_default())
            }
        }
    }
}

/// The send half of a [`Framer`].
pub struct FrameWriter<C> {
    conn: Arc<C>,
}

impl<C> Clone for FrameWriter<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl<C: Connection> FrameWriter<C> {
    /// Sends one logical message as one complete transport unit.
    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.conn.send(text).await
    }
}
