//! Shared test transport and capture helpers
//!
//! The scripted connector hands every connection it opens back to the test,
//! which then plays the server side: confirming the handshake, delivering
//! messages, or dropping the connection.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use trainwatch_client::config::{Config, LoggingConfig, ReconnectConfig, ServerConfig};
use trainwatch_client::event::{MetricsUpdate, TrainingComplete};
use trainwatch_client::transport::{Connector, Transport, TransportError, TransportEvent};
use trainwatch_client::{EventHandlers, StreamError};

/// Build a config with the given retry policy
pub fn test_config(max_attempts: u32, delay_ms: u64) -> Arc<Config> {
    Arc::new(Config {
        server: ServerConfig {
            endpoint: "ws://localhost:8000/ws/train".to_string(),
        },
        reconnect: ReconnectConfig {
            max_attempts,
            delay_ms,
        },
        logging: LoggingConfig::default(),
    })
}

/// The test's side of one opened connection
pub struct TestConn {
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl TestConn {
    /// Confirm the handshake
    pub fn opened(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    /// Deliver one inbound message
    pub fn message(&self, json: &str) {
        let _ = self
            .events
            .send(TransportEvent::Message(Bytes::copy_from_slice(
                json.as_bytes(),
            )));
    }

    /// Report the connection closed
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Report a connection failure
    pub fn fail(&self, info: &str) {
        let _ = self.events.send(TransportEvent::Error(info.to_string()));
    }

    /// Whether the client closed this connection from its side
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct HubTransport {
    closed: Arc<AtomicBool>,
}

impl Transport for HubTransport {
    fn send(&mut self, _payload: Bytes) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that hands each opened connection back to the test
pub struct TestConnector {
    conns: mpsc::UnboundedSender<TestConn>,
    opens: Arc<AtomicUsize>,
}

/// Create a connector plus the channel its connections arrive on and a
/// counter of open attempts
pub fn test_connector() -> (
    TestConnector,
    mpsc::UnboundedReceiver<TestConn>,
    Arc<AtomicUsize>,
) {
    let (conns_tx, conns_rx) = mpsc::unbounded_channel();
    let opens = Arc::new(AtomicUsize::new(0));
    (
        TestConnector {
            conns: conns_tx,
            opens: opens.clone(),
        },
        conns_rx,
        opens,
    )
}

impl Connector for TestConnector {
    fn open(&mut self) -> (Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>) {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.conns.send(TestConn {
            events: event_tx,
            closed: closed.clone(),
        });
        (Box::new(HubTransport { closed }), event_rx)
    }
}

/// Wait for the next connection the client opens
pub async fn next_conn(rx: &mut mpsc::UnboundedReceiver<TestConn>) -> TestConn {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a connection attempt")
        .expect("connector dropped")
}

/// Records every handler invocation
#[derive(Clone, Default)]
pub struct Capture {
    pub updates: Arc<Mutex<Vec<MetricsUpdate>>>,
    pub completions: Arc<Mutex<Vec<TrainingComplete>>>,
    pub errors: Arc<Mutex<Vec<StreamError>>>,
}

impl Capture {
    /// Handlers that record into this capture
    pub fn handlers(&self) -> EventHandlers {
        let updates = self.updates.clone();
        let completions = self.completions.clone();
        let errors = self.errors.clone();
        EventHandlers::new()
            .on_update(move |m| updates.lock().push(m))
            .on_complete(move |c| completions.lock().push(c))
            .on_error(move |e| errors.lock().push(e))
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    /// True when no handler has fired at all
    pub fn is_silent(&self) -> bool {
        self.update_count() == 0 && self.completion_count() == 0 && self.error_count() == 0
    }
}

/// Poll a condition until it holds or two seconds pass
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

/// Give the manager task a moment to drain anything queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
