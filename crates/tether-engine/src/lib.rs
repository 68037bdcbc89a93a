//! Self-reconnecting connection lifecycle for Tether.
//!
//! An [`Engine`] keeps one logical connection to an endpoint alive across
//! any number of physical connections. It owns a receiver loop that feeds
//! messages to a protocol [`Handler`], a sender loop that drains a single
//! ordered outbound queue, and a reconnect sequence with exponential
//! backoff and a fast-disconnect penalty.
//!
//! # Key types
//!
//! - [`Engine`] — start, stop, enqueue, reconnect
//! - [`Handler`] — the hooks a protocol adapter implements
//! - [`Link`] — what a hook gets to talk back to the engine
//! - [`EngineState`] — `Stopped`, `Connected` or `Reconnecting`
//! - [`EngineConfig`] / [`Backoff`] — endpoint and retry schedule

mod config;
mod engine;
mod error;
mod handler;
mod state;

pub use config::{Backoff, DispatchMode, EngineConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use handler::{Handler, HookError, HookResult, Link};
pub use state::{EngineState, GenerationId, ReconnectOutcome};
