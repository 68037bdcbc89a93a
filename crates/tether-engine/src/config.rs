//! Engine configuration: endpoint, backoff schedule and hook dispatch.
//!
//! Durations (de)serialize in serde's default `{ secs, nanos }` form.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff schedule shared by reconnect attempts and the
/// fast-disconnect penalty.
///
/// `delay(k) = base * 2^min(k, max_exponent)`. With the defaults this is
/// 1s, 2s, 4s, ... capped at 128s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    /// Delay for exponent 0.
    pub base: Duration,
    /// Exponent at which the delay stops growing.
    pub max_exponent: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_exponent: 7,
        }
    }
}

impl Backoff {
    /// Largest accepted `max_exponent`.
    pub const MAX_EXPONENT_LIMIT: u32 = 16;

    /// Delay for the given exponent (attempt number or fast-disconnect count).
    pub fn delay(&self, exponent: u32) -> Duration {
        let factor = 1u32 << exponent.min(self.max_exponent).min(Self::MAX_EXPONENT_LIMIT);
        self.base.saturating_mul(factor)
    }

    /// Extra wait owed by a connection that lived only `lifetime` after
    /// `fast_disconnects` previous fast disconnects.
    ///
    /// Returns `None` when the connection lived at least as long as the
    /// window `delay(fast_disconnects)`, which resets the fast-disconnect
    /// counter. A lifetime exactly equal to the window is not fast.
    pub fn fast_disconnect_penalty(
        &self,
        lifetime: Duration,
        fast_disconnects: u32,
    ) -> Option<Duration> {
        self.delay(fast_disconnects)
            .checked_sub(lifetime)
            .filter(|remaining| !remaining.is_zero())
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// How the receiver loop hands work to the [`Handler`](crate::Handler).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Every hook invocation runs in its own task. The receiver never
    /// blocks on handler work, and hooks may run concurrently.
    #[default]
    Spawn,
    /// Hooks run on the receiver task, one at a time in arrival order.
    /// A slow hook delays reading. `on_connected` completes before the
    /// first `on_message` of the same generation.
    Inline,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Full configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Endpoint handed to the connector on every connect.
    pub uri: String,
    /// Reconnect and fast-disconnect schedule.
    pub backoff: Backoff,
    /// Hook dispatch mode.
    pub dispatch: DispatchMode,
    /// Upper bound on a graceful close handshake before it is abandoned.
    pub close_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            backoff: Backoff::default(),
            dispatch: DispatchMode::default(),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Create a config for an endpoint with defaults for everything else.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Replace the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the dispatch mode.
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Clamp and fix out-of-range values.
    ///
    /// Called automatically by [`Engine::new`](crate::Engine::new):
    /// - `backoff.max_exponent` capped to [`Backoff::MAX_EXPONENT_LIMIT`].
    /// - A zero `backoff.base` is replaced by the default base.
    /// - A zero `close_timeout` is replaced by the default timeout.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.backoff.max_exponent > Backoff::MAX_EXPONENT_LIMIT {
            warn!(
                max_exponent = self.backoff.max_exponent,
                limit = Backoff::MAX_EXPONENT_LIMIT,
                "backoff max_exponent exceeds limit, clamping"
            );
            self.backoff.max_exponent = Backoff::MAX_EXPONENT_LIMIT;
        }
        if self.backoff.base.is_zero() {
            warn!("backoff base is zero, using default");
            self.backoff.base = defaults.backoff.base;
        }
        if self.close_timeout.is_zero() {
            warn!("close_timeout is zero, using default");
            self.close_timeout = defaults.close_timeout;
        }
        self
    }
}
