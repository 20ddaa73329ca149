//! TrainWatch Client Library
//!
//! A resilient streaming client for live model-training telemetry. The
//! client drives one long-lived session at a time against a remote training
//! endpoint, dispatches typed events to caller-registered handlers, and
//! re-establishes lost connections automatically.

pub mod config;
pub mod event;
pub mod session;
pub mod transport;
pub mod util;

pub use config::Config;
pub use session::{EventHandlers, SessionPhase, StreamClient, StreamError};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
