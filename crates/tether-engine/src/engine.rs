//! The lifecycle engine: start, stop, reconnect, and the per-generation
//! receiver and sender loops.
//!
//! # Serialization
//!
//! One async mutex guards the lifecycle (running flag, current generation,
//! fast-disconnect bookkeeping). `start`, `stop` and the bookkeeping parts
//! of a reconnect sequence run under it; the penalty and backoff sleeps run
//! outside it so `stop` can interrupt them. The loops never take it.
//!
//! # Generations
//!
//! Each connect attempt that `start` or a reconnect sequence makes is
//! owned by a fresh [`GenerationId`] and [`CancellationToken`]. Ending a
//! generation cancels its token, which ends its loops and every wait
//! (sleep, connect) performed on its behalf. Reconnect requests carry the
//! generation that raised them and are dropped once that generation is no
//! longer current.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use tether_protocol::{FrameWriter, Framer, Inbound};
use tether_transport::{Connection, Connector};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{DispatchMode, EngineConfig};
use crate::error::EngineError;
use crate::handler::{Control, Handler, HookResult, Link};
use crate::state::{EngineState, GenerationId, ReconnectOutcome};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// One connection and the tasks it owns.
///
/// While a reconnect sequence is connecting, the current generation has a
/// token but no connection and no tasks yet.
struct Generation<T> {
    id: GenerationId,
    token: CancellationToken,
    connection: Option<Arc<T>>,
    receiver: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl<T> Generation<T> {
    fn pending(id: GenerationId, token: CancellationToken) -> Self {
        Self {
            id,
            token,
            connection: None,
            receiver: None,
            sender: None,
        }
    }
}

struct Lifecycle<T> {
    running: bool,
    reconnecting: bool,
    current: Option<Generation<T>>,
    next_generation: u64,
    connected_at: Option<Instant>,
    fast_disconnects: u32,
}

impl<T> Lifecycle<T> {
    fn next_generation(&mut self) -> GenerationId {
        self.next_generation += 1;
        GenerationId::new(self.next_generation)
    }

    fn current_id(&self) -> Option<GenerationId> {
        self.current.as_ref().map(|generation| generation.id)
    }
}

/// The outbound queue's consuming side, owned by whichever sender loop
/// holds the lock.
struct Outbound {
    rx: mpsc::UnboundedReceiver<String>,
    /// A message whose send failed or was interrupted. Sent before
    /// anything else in the queue.
    parked: Option<String>,
}

struct Inner<C: Connector, H> {
    connector: C,
    handler: H,
    config: EngineConfig,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound: Mutex<Outbound>,
    lifecycle: Mutex<Lifecycle<C::Connection>>,
    state: watch::Sender<EngineState>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A self-healing connection to one endpoint.
///
/// Cheap to clone; clones share the same engine.
pub struct Engine<C: Connector, H: Handler> {
    inner: Arc<Inner<C, H>>,
}

impl<C: Connector, H: Handler> Clone for Engine<C, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector, H: Handler> Engine<C, H> {
    /// Creates a stopped engine. The configuration is validated first.
    pub fn new(connector: C, handler: H, config: EngineConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(EngineState::Stopped);
        Self {
            inner: Arc::new(Inner {
                connector,
                handler,
                config: config.validated(),
                outbound_tx,
                outbound: Mutex::new(Outbound {
                    rx: outbound_rx,
                    parked: None,
                }),
                lifecycle: Mutex::new(Lifecycle {
                    running: false,
                    reconnecting: false,
                    current: None,
                    next_generation: 0,
                    connected_at: None,
                    fast_disconnects: 0,
                }),
                state,
            }),
        }
    }

    /// Connects and starts the receiver and sender loops.
    ///
    /// Fails with [`EngineError::AlreadyRunning`] if running, or with
    /// [`EngineError::Connect`] if the connect fails, in which case the
    /// engine stays stopped and can be started again.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.inner.start().await
    }

    /// Closes the connection, ends every task, and discards anything still
    /// queued for sending. Also aborts a reconnect sequence in progress.
    ///
    /// Fails with [`EngineError::NotRunning`] if the engine is stopped.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.inner.stop().await
    }

    /// Appends a message to the outbound queue. Never blocks.
    ///
    /// Queued messages survive reconnects and are sent in order once a
    /// connection is live. They are discarded by `stop`.
    pub fn enqueue(&self, text: impl Into<String>) {
        if self.inner.outbound_tx.send(text.into()).is_err() {
            debug!("outbound queue gone, dropping message");
        }
    }

    /// Runs a reconnect sequence and waits for it to finish.
    ///
    /// Returns [`ReconnectOutcome::Ignored`] without doing anything if the
    /// engine is stopped or a reconnect is already in flight.
    pub async fn reconnect(&self) -> ReconnectOutcome {
        self.inner.reconnect(None).await
    }

    /// Starts a reconnect sequence in the background.
    pub fn request_reconnect(&self) {
        Arc::clone(&self.inner).request_reconnect(None);
    }

    /// The current state.
    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    /// Returns `true` between a successful `start` and the next `stop`.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// A receiver notified on every state change.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// The validated configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The handler this engine dispatches to.
    pub fn handler(&self) -> &H {
        &self.inner.handler
    }
}

impl<C: Connector, H: Handler> std::fmt::Debug for Engine<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("uri", &self.inner.config.uri)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle operations
// ---------------------------------------------------------------------------

impl<C: Connector, H: Handler> Inner<C, H> {
    async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            return Err(EngineError::AlreadyRunning);
        }

        let uri = &self.config.uri;
        info!(%uri, "connecting");
        let connection = match self.connector.connect(uri).await {
            Ok(connection) => connection,
            Err(e) => {
                error!(%uri, error = %e, "connect failed");
                return Err(EngineError::Connect(e));
            }
        };

        let id = lifecycle.next_generation();
        lifecycle.running = true;
        lifecycle.fast_disconnects = 0;
        self.install(&mut lifecycle, id, CancellationToken::new(), connection);
        info!(%uri, generation = %id, "connected");
        Ok(())
    }

    async fn stop(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.running {
            return Err(EngineError::NotRunning);
        }

        info!(uri = %self.config.uri, "stopping");
        if let Some(generation) = lifecycle.current.take() {
            if let Some(connection) = &generation.connection {
                self.close(connection, generation.id).await;
            }
            generation.token.cancel();
            Self::join(generation).await;
        }

        lifecycle.running = false;
        lifecycle.reconnecting = false;
        lifecycle.connected_at = None;
        lifecycle.fast_disconnects = 0;

        let discarded = self.discard_outbound().await;
        if discarded > 0 {
            debug!(discarded, "discarded queued messages");
        }

        self.state.send_replace(EngineState::Stopped);
        info!(uri = %self.config.uri, "stopped");
        Ok(())
    }

    async fn reconnect(self: &Arc<Self>, origin: Option<GenerationId>) -> ReconnectOutcome {
        let (id, token, penalty) = {
            let mut lifecycle = self.lifecycle.lock().await;
            if !lifecycle.running {
                debug!("reconnect requested while stopped");
                return ReconnectOutcome::Ignored;
            }
            if let Some(origin) = origin {
                if lifecycle.current_id() != Some(origin) {
                    debug!(generation = %origin, "stale reconnect request");
                    return ReconnectOutcome::Ignored;
                }
            }
            if lifecycle.reconnecting {
                debug!("concurrent reconnect request");
                return ReconnectOutcome::Ignored;
            }

            lifecycle.reconnecting = true;
            let lifetime = lifecycle
                .connected_at
                .take()
                .map(|since| since.elapsed())
                .unwrap_or_default();
            info!(uri = %self.config.uri, ?lifetime, "reconnecting");
            // Published before teardown: the old close may take up to
            // `close_timeout` on a half-dead socket.
            self.state.send_replace(EngineState::Reconnecting { attempt: 0 });

            let id = lifecycle.next_generation();
            let token = CancellationToken::new();
            if let Some(old) = lifecycle.current.replace(Generation::pending(id, token.clone())) {
                old.token.cancel();
                let old_id = old.id;
                let connection = old.connection.clone();
                Self::join(old).await;
                if let Some(connection) = connection {
                    self.close(&connection, old_id).await;
                }
            }

            let penalty = self
                .config
                .backoff
                .fast_disconnect_penalty(lifetime, lifecycle.fast_disconnects);
            match penalty {
                Some(_) => lifecycle.fast_disconnects = lifecycle.fast_disconnects.saturating_add(1),
                None => lifecycle.fast_disconnects = 0,
            }
            (id, token, penalty)
        };

        if let Some(penalty) = penalty {
            warn!(?penalty, "fast disconnect, delaying reconnect");
            if !sleep_unless_cancelled(&token, penalty).await {
                debug!("reconnect aborted");
                return ReconnectOutcome::Aborted;
            }
        }

        let uri = &self.config.uri;
        let mut attempt: u32 = 0;
        loop {
            debug!(%uri, attempt, "reconnect attempt");
            let connected = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("reconnect aborted");
                    return ReconnectOutcome::Aborted;
                }
                connected = self.connector.connect(uri) => connected,
            };

            match connected {
                Ok(connection) => {
                    let mut lifecycle = self.lifecycle.lock().await;
                    if token.is_cancelled() || lifecycle.current_id() != Some(id) {
                        drop(lifecycle);
                        debug!("reconnect aborted after connect");
                        self.close(&connection, id).await;
                        return ReconnectOutcome::Aborted;
                    }
                    self.install(&mut lifecycle, id, token, connection);
                    lifecycle.reconnecting = false;
                    info!(%uri, generation = %id, "reconnected");
                    return ReconnectOutcome::Reconnected;
                }
                Err(e) => {
                    error!(%uri, attempt, error = %e, "reconnect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.config.backoff.delay(attempt);
            self.state.send_replace(EngineState::Reconnecting { attempt });
            debug!(attempt, ?delay, "delaying reconnect");
            if !sleep_unless_cancelled(&token, delay).await {
                debug!("reconnect aborted");
                return ReconnectOutcome::Aborted;
            }
        }
    }

    /// Makes `connection` the live connection of generation `id` and spawns
    /// its loops. Called with the lifecycle lock held.
    fn install(
        self: &Arc<Self>,
        lifecycle: &mut Lifecycle<C::Connection>,
        id: GenerationId,
        token: CancellationToken,
        connection: C::Connection,
    ) {
        let connection = Arc::new(connection);
        let since = Instant::now();
        // Published before the loops start so hooks observe `Connected`.
        self.state
            .send_replace(EngineState::Connected { generation: id, since });

        let framer = Framer::new(Arc::clone(&connection), self.handler.split_policy());
        let writer = framer.writer();
        let link = self.link(id, &token);

        let receiver = tokio::spawn(Arc::clone(self).receive_loop(framer, link.clone()));
        let sender = tokio::spawn(Arc::clone(self).send_loop(writer, link.clone()));
        if self.config.dispatch == DispatchMode::Spawn {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                run_hook("on_connected", inner.handler.on_connected(link)).await;
            });
        }

        lifecycle.current = Some(Generation {
            id,
            token,
            connection: Some(connection),
            receiver: Some(receiver),
            sender: Some(sender),
        });
        lifecycle.connected_at = Some(since);
    }

    fn link(self: &Arc<Self>, id: GenerationId, token: &CancellationToken) -> Link {
        let weak: Weak<Self> = Arc::downgrade(self);
        let control: Weak<dyn Control> = weak;
        Link::new(
            id,
            self.outbound_tx.clone(),
            self.state.subscribe(),
            token.clone(),
            control,
        )
    }

    /// Graceful close, bounded by the configured timeout. Failures are
    /// logged and otherwise ignored.
    async fn close(&self, connection: &C::Connection, generation: GenerationId) {
        let id = connection.id();
        match tokio::time::timeout(self.config.close_timeout, connection.close()).await {
            Ok(Ok(())) => debug!(%id, %generation, "connection closed"),
            Ok(Err(e)) => warn!(%id, %generation, error = %e, "close failed"),
            Err(_) => warn!(%id, %generation, "close timed out"),
        }
    }

    /// Waits for a generation's loops to finish. Its token must already be
    /// cancelled.
    async fn join(generation: Generation<C::Connection>) {
        for handle in [generation.receiver, generation.sender].into_iter().flatten() {
            if let Err(e) = handle.await {
                error!(generation = %generation.id, error = %e, "loop task failed");
            }
        }
    }

    async fn discard_outbound(&self) -> usize {
        let mut outbound = self.outbound.lock().await;
        let mut discarded = usize::from(outbound.parked.take().is_some());
        while outbound.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    async fn receive_loop(self: Arc<Self>, mut framer: Framer<C::Connection>, link: Link) {
        let generation = link.generation();
        let token = link.token().clone();
        debug!(%generation, "receiver started");

        if self.config.dispatch == DispatchMode::Inline {
            let hook = run_hook("on_connected", self.handler.on_connected(link.clone()));
            if !run_unless_cancelled(&token, hook).await {
                debug!(%generation, "receiver cancelled");
                return;
            }
        }

        loop {
            let inbound = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(%generation, "receiver cancelled");
                    return;
                }
                inbound = framer.receive_one() => inbound,
            };

            match inbound {
                Inbound::Message(text) if text.is_empty() => {}
                Inbound::Message(text) => {
                    trace!(%generation, message = %text, "received");
                    match self.config.dispatch {
                        DispatchMode::Spawn => {
                            let inner = Arc::clone(&self);
                            let link = link.clone();
                            tokio::spawn(async move {
                                run_hook("on_message", inner.handler.on_message(text, link)).await;
                            });
                        }
                        DispatchMode::Inline => {
                            let hook = run_hook("on_message", self.handler.on_message(text, link.clone()));
                            if !run_unless_cancelled(&token, hook).await {
                                debug!(%generation, "receiver cancelled");
                                return;
                            }
                        }
                    }
                }
                Inbound::Closed => {
                    info!(%generation, "connection closed by peer");
                    break;
                }
                Inbound::Error(e) => {
                    error!(%generation, error = %e, "receive failed");
                    break;
                }
            }
        }

        if token.is_cancelled() {
            return;
        }
        Arc::clone(&self).request_reconnect(Some(generation));
    }

    async fn send_loop(self: Arc<Self>, writer: FrameWriter<C::Connection>, link: Link) {
        let generation = link.generation();
        let token = link.token().clone();
        debug!(%generation, "sender started");

        // Held for the loop's lifetime so exactly one sender drains the queue.
        let mut outbound = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            outbound = self.outbound.lock() => outbound,
        };

        loop {
            let text = match outbound.parked.take() {
                Some(text) => text,
                None => {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            debug!(%generation, "sender cancelled");
                            return;
                        }
                        next = outbound.rx.recv() => next,
                    };
                    match next {
                        Some(text) => text,
                        None => return,
                    }
                }
            };

            let sent = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                sent = writer.send(&text) => Some(sent),
            };
            match sent {
                Some(Ok(())) => trace!(%generation, message = %text, "sent"),
                Some(Err(e)) => {
                    warn!(%generation, error = %e, "send failed");
                    outbound.parked = Some(text);
                    break;
                }
                None => {
                    outbound.parked = Some(text);
                    debug!(%generation, "sender cancelled");
                    return;
                }
            }
        }

        drop(outbound);
        if token.is_cancelled() {
            return;
        }
        Arc::clone(&self).request_reconnect(Some(generation));
    }
}

impl<C: Connector, H: Handler> Control for Inner<C, H> {
    fn request_reconnect(self: Arc<Self>, origin: Option<GenerationId>) {
        tokio::spawn(async move {
            self.reconnect(origin).await;
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Awaits a hook, logging its error or panic.
async fn run_hook(hook: &'static str, fut: impl Future<Output = HookResult>) {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(hook, error = %e, "hook failed"),
        Err(_) => error!(hook, "hook panicked"),
    }
}

/// Returns `false` if `token` was cancelled before `fut` completed.
async fn run_unless_cancelled(token: &CancellationToken, fut: impl Future<Output = ()>) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = fut => true,
    }
}

/// Returns `false` if `token` was cancelled before `delay` elapsed.
async fn sleep_unless_cancelled(token: &CancellationToken, delay: std::time::Duration) -> bool {
    run_unless_cancelled(token, tokio::time::sleep(delay)).await
}
