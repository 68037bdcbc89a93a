//! Application-level liveness probing shared by the protocol clients.
//!
//! Every `ping_interval` the keepalive task enqueues the protocol's ping
//! and waits `max_pong_delay`. If the handler has not seen a pong since the
//! ping was queued, the connection is assumed dead and a reconnect is
//! requested. No ping is sent while a reconnect is in progress.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_engine::{Engine, Handler};
use tether_transport::Connector;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Ping cadence and pong deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Time between two pings.
    pub ping_interval: Duration,
    /// How long a pong may take before the connection is considered dead.
    /// Must be shorter than `ping_interval`.
    pub max_pong_delay: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(4 * 60),
            max_pong_delay: Duration::from_secs(10),
        }
    }
}

impl KeepaliveConfig {
    /// Clamp and fix out-of-range values.
    ///
    /// - A zero `ping_interval` is replaced by the default.
    /// - `max_pong_delay` is forced below `ping_interval` (half of it when
    ///   out of range).
    pub fn validated(mut self) -> Self {
        if self.ping_interval.is_zero() {
            warn!("ping_interval is zero, using default");
            self.ping_interval = Self::default().ping_interval;
        }
        if self.max_pong_delay.is_zero() || self.max_pong_delay >= self.ping_interval {
            warn!(
                max_pong_delay = ?self.max_pong_delay,
                ping_interval = ?self.ping_interval,
                "max_pong_delay must be shorter than ping_interval, clamping"
            );
            self.max_pong_delay = self.ping_interval / 2;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// When the last pong was seen. Written by a protocol handler, read by the
/// keepalive task.
#[derive(Debug)]
pub struct Liveness {
    last_pong: watch::Sender<Option<Instant>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            last_pong: watch::channel(None).0,
        }
    }
}

impl Liveness {
    /// Records a pong received now.
    pub fn mark_pong(&self) {
        self.last_pong.send_replace(Some(Instant::now()));
    }

    /// When the last pong was received, if ever.
    pub fn last_pong(&self) -> Option<Instant> {
        *self.last_pong.borrow()
    }

    /// Returns `true` if a pong was received at or after `instant`.
    pub fn pong_since(&self, instant: Instant) -> bool {
        self.last_pong().is_some_and(|at| at >= instant)
    }
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// The keepalive loop for one client: what to send and where pongs land.
#[derive(Debug, Clone)]
pub struct Keepalive {
    config: KeepaliveConfig,
    ping: String,
    liveness: Arc<Liveness>,
}

impl Keepalive {
    /// Creates a keepalive that sends `ping` and watches `liveness`.
    pub fn new(config: KeepaliveConfig, ping: impl Into<String>, liveness: Arc<Liveness>) -> Self {
        Self {
            config: config.validated(),
            ping: ping.into(),
            liveness,
        }
    }

    /// The validated configuration.
    pub fn config(&self) -> &KeepaliveConfig {
        &self.config
    }

    /// Spawns the loop against `engine`. It runs until the returned task
    /// is stopped.
    pub fn spawn<C: Connector, H: Handler>(&self, engine: Engine<C, H>) -> KeepaliveTask {
        let token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run(engine, token.clone()));
        KeepaliveTask { token, handle }
    }

    async fn run<C: Connector, H: Handler>(self, engine: Engine<C, H>, token: CancellationToken) {
        let idle = self.config.ping_interval - self.config.max_pong_delay;
        debug!(interval = ?self.config.ping_interval, "keepalive started");

        loop {
            if !sleep_unless_cancelled(&token, idle).await {
                break;
            }
            if engine.state().is_reconnecting() {
                trace!("reconnecting, skipping ping");
                if !sleep_unless_cancelled(&token, self.config.max_pong_delay).await {
                    break;
                }
                continue;
            }

            let pinged_at = Instant::now();
            engine.enqueue(self.ping.as_str());
            trace!("ping enqueued");

            if !sleep_unless_cancelled(&token, self.config.max_pong_delay).await {
                break;
            }
            if !self.liveness.pong_since(pinged_at) {
                warn!(
                    max_pong_delay = ?self.config.max_pong_delay,
                    "no pong received in time, reconnecting"
                );
                engine.request_reconnect();
            }
        }
        debug!("keepalive stopped");
    }
}

/// A running keepalive loop.
#[derive(Debug)]
pub struct KeepaliveTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl KeepaliveTask {
    /// Cancels the loop and waits for it to exit.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "keepalive task failed");
        }
    }
}

/// Returns `false` if `token` was cancelled before `delay` elapsed.
async fn sleep_unless_cancelled(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KeepaliveConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(240));
        assert_eq!(config.max_pong_delay, Duration::from_secs(10));
        assert_eq!(config.validated(), config);
    }

    #[test]
    fn test_validated_forces_pong_delay_below_interval() {
        let config = KeepaliveConfig {
            ping_interval: Duration::from_secs(10),
            max_pong_delay: Duration::from_secs(30),
        }
        .validated();
        assert_eq!(config.max_pong_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_validated_replaces_zero_interval() {
        let config = KeepaliveConfig {
            ping_interval: Duration::ZERO,
            max_pong_delay: Duration::from_secs(10),
        }
        .validated();
        assert_eq!(config.ping_interval, Duration::from_secs(240));
        assert_eq!(config.max_pong_delay, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_tracks_last_pong() {
        let liveness = Liveness::default();
        let before = Instant::now();
        assert!(!liveness.pong_since(before));

        tokio::time::advance(Duration::from_secs(1)).await;
        liveness.mark_pong();
        assert!(liveness.pong_since(before));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!liveness.pong_since(Instant::now()));
    }
}
