//! Transport abstraction
//!
//! The client drives an external bidirectional connection through this seam.
//! A [`Connector`] starts one connection attempt per call and hands back a
//! [`Transport`] handle together with the channel its events arrive on. The
//! handshake outcome is itself an event: a successful open delivers
//! [`TransportEvent::Opened`], a failed one delivers
//! [`TransportEvent::Error`] or [`TransportEvent::Closed`].

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Events delivered by a connection in progress or in flight
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection finished its handshake and is ready
    Opened,
    /// A complete inbound message
    Message(Bytes),
    /// The connection closed
    Closed { code: u16, reason: String },
    /// The connection failed
    Error(String),
}

/// Errors produced by a transport handle
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection is no longer writable
    #[error("connection closed")]
    Closed,
    /// An I/O level failure
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Handle to one connection attempt
pub trait Transport: Send {
    /// Queue an outbound message
    fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    fn close(&mut self);
}

/// Opens connections to the configured endpoint
///
/// `open` must return immediately; connection progress, messages, and the
/// eventual close all arrive on the returned receiver in delivery order.
pub trait Connector: Send + 'static {
    /// Begin one connection attempt
    fn open(&mut self) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>);
}
