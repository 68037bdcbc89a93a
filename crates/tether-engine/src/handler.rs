//! The protocol-adapter seam: hooks the engine calls, and the [`Link`]
//! handle hooks use to talk back to it.

use std::error::Error;
use std::future::Future;
use std::sync::{Arc, Weak};

use tether_protocol::SplitPolicy;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::state::{EngineState, GenerationId};

/// Error type returned by hooks. Logged by the engine, never propagated.
pub type HookError = Box<dyn Error + Send + Sync>;

/// Result type returned by hooks.
pub type HookResult = Result<(), HookError>;

/// Protocol-specific behavior plugged into an [`Engine`](crate::Engine).
///
/// Errors and panics raised by either hook are caught and logged at
/// error level; they never stop the engine or trigger a reconnect.
///
/// Hooks must reach the engine through the [`Link`] they are given.
/// Awaiting `Engine::stop` or `Engine::reconnect` from a hook running in
/// [`DispatchMode::Inline`](crate::DispatchMode::Inline) deadlocks.
pub trait Handler: Send + Sync + 'static {
    /// How inbound transport units are split into messages.
    fn split_policy(&self) -> SplitPolicy {
        SplitPolicy::Lines
    }

    /// Called once per successful connect, initial or reconnect.
    fn on_connected(&self, link: Link) -> impl Future<Output = HookResult> + Send;

    /// Called once per non-empty inbound message.
    fn on_message(&self, text: String, link: Link) -> impl Future<Output = HookResult> + Send;
}

/// Engine operations reachable from a [`Link`] without naming the
/// engine's type parameters.
pub(crate) trait Control: Send + Sync {
    /// Runs a reconnect sequence in the background. A request tagged with
    /// a generation other than the current one is ignored.
    fn request_reconnect(self: Arc<Self>, origin: Option<GenerationId>);
}

/// Handle given to hooks, bound to the generation that invoked them.
#[derive(Clone)]
pub struct Link {
    generation: GenerationId,
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Receiver<EngineState>,
    token: CancellationToken,
    control: Weak<dyn Control>,
}

impl Link {
    pub(crate) fn new(
        generation: GenerationId,
        outbound: mpsc::UnboundedSender<String>,
        state: watch::Receiver<EngineState>,
        token: CancellationToken,
        control: Weak<dyn Control>,
    ) -> Self {
        Self {
            generation,
            outbound,
            state,
            token,
            control,
        }
    }

    /// The generation this link belongs to.
    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Appends a message to the engine's outbound queue.
    ///
    /// Never blocks. Messages are sent in enqueue order by whichever
    /// generation is current when they reach the front of the queue.
    pub fn enqueue(&self, text: impl Into<String>) {
        if self.outbound.send(text.into()).is_err() {
            tracing::debug!(generation = %self.generation, "outbound queue gone, dropping message");
        }
    }

    /// Asks the engine to reconnect without waiting for the outcome.
    ///
    /// Ignored once this link's generation has been superseded.
    pub fn reconnect(&self) {
        if let Some(control) = self.control.upgrade() {
            control.request_reconnect(Some(self.generation));
        }
    }

    /// The engine's current state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once this link's generation has ended.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when this link's generation ends.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("generation", &self.generation)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
