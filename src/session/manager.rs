//! Session manager
//!
//! Owns the single live session: starts transport opens, dispatches inbound
//! events to the registered handlers, and re-opens lost connections until
//! the attempt budget is spent. Everything runs on one task, so transitions
//! happen strictly in the order events are delivered.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::handlers::{EventHandlers, HandlerSet, StreamError};
use super::state::{LossDecision, Session, SessionPhase};
use crate::config::Config;
use crate::event::{self, StreamEvent};
use crate::transport::{Connector, Transport, TransportEvent};

/// Commands accepted by the manager task
enum Command {
    Connect(EventHandlers),
    Disconnect,
}

/// What woke the manager task up
enum Wakeup {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    RetryTimer,
}

/// Handle to a running client
///
/// Creating a client spawns its manager task; dropping the handle (or
/// calling [`shutdown`](StreamClient::shutdown)) stops it. Clients are
/// independent of each other, so several can coexist in one process.
pub struct StreamClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    phase: Arc<RwLock<SessionPhase>>,
    task: JoinHandle<()>,
}

impl StreamClient {
    /// Create a client and spawn its manager task
    pub fn new(config: Arc<Config>, connector: Box<dyn Connector>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let phase = Arc::new(RwLock::new(SessionPhase::Idle));

        let manager = ConnectionManager {
            session: Session::new(config.reconnect.max_attempts),
            config,
            connector,
            handlers: HandlerSet::default(),
            transport: None,
            events: None,
            retry_at: None,
            cmd_rx,
            phase: phase.clone(),
        };
        let task = tokio::spawn(manager.run());

        Self {
            cmd_tx,
            phase,
            task,
        }
    }

    /// Start a session, superseding any current one
    ///
    /// Handler overrides are partial; unspecified kinds keep whatever was
    /// registered before. Never fails synchronously — every outcome arrives
    /// through the handlers.
    pub fn connect(&self, handlers: EventHandlers) {
        let _ = self.cmd_tx.send(Command::Connect(handlers));
    }

    /// Stop the current session, if any
    ///
    /// Cancels a pending reconnect and closes the transport. The teardown
    /// this triggers is never reported through the error handler. No-op when
    /// nothing is running.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Snapshot of the current session phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    /// Stop the manager task and wait for it to exit
    pub async fn shutdown(self) {
        drop(self.cmd_tx);
        let _ = self.task.await;
    }
}

/// Drives the session state machine
struct ConnectionManager {
    config: Arc<Config>,
    connector: Box<dyn Connector>,
    session: Session,
    handlers: HandlerSet,
    transport: Option<Box<dyn Transport>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    retry_at: Option<Instant>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    phase: Arc<RwLock<SessionPhase>>,
}

impl ConnectionManager {
    async fn run(mut self) {
        loop {
            let wakeup = {
                let events = self.events.as_mut();
                let retry_at = self.retry_at;

                // Commands take priority: a disconnect queued before an
                // in-flight transport event must win the race.
                tokio::select! {
                    biased;

                    cmd = self.cmd_rx.recv() => Wakeup::Command(cmd),
                    ev = async {
                        match events {
                            Some(rx) => rx.recv().await,
                            None => std::future::pending().await,
                        }
                    } => Wakeup::Transport(ev),
                    _ = async {
                        match retry_at {
                            Some(at) => tokio::time::sleep_until(at).await,
                            None => std::future::pending().await,
                        }
                    } => Wakeup::RetryTimer,
                }
            };

            match wakeup {
                Wakeup::Command(Some(Command::Connect(overrides))) => {
                    self.start_session(overrides)
                }
                Wakeup::Command(Some(Command::Disconnect)) => self.stop_session(),
                Wakeup::Command(None) => {
                    // Client handle dropped or shut down
                    self.stop_session();
                    break;
                }
                Wakeup::Transport(Some(event)) => self.handle_transport_event(event),
                Wakeup::Transport(None) => {
                    debug!("transport event channel closed");
                    self.handle_connection_lost();
                }
                Wakeup::RetryTimer => {
                    self.retry_at = None;
                    self.open_transport();
                }
            }
        }
    }

    /// Begin a fresh session
    fn start_session(&mut self, overrides: EventHandlers) {
        // Tear down whatever is live first; a superseded session's late
        // events must not be able to reach the new handlers.
        self.drop_transport();
        self.retry_at = None;
        self.handlers.apply(overrides);
        self.session = Session::new(self.config.reconnect.max_attempts);
        self.open_transport();
    }

    /// Intentional stop requested by the caller
    fn stop_session(&mut self) {
        self.retry_at = None;
        self.drop_transport();
        self.session.set_idle();
        self.publish_phase();
        debug!("session stopped");
    }

    /// Release the transport and unhook its event channel
    ///
    /// Dropping the receiver makes any in-flight event unroutable, which is
    /// what swallows the close and error notifications a teardown produces.
    fn drop_transport(&mut self) {
        self.events = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    /// Request one transport open
    fn open_transport(&mut self) {
        if self.session.phase() == SessionPhase::Opening {
            debug!("open already in flight, ignoring");
            return;
        }

        debug!(
            attempt = self.session.attempts() + 1,
            max = self.config.reconnect.max_attempts,
            endpoint = %self.config.server.endpoint,
            "opening transport"
        );

        let (transport, events) = self.connector.open();
        self.transport = Some(transport);
        self.events = Some(events);
        self.retry_at = None;
        self.session.set_opening();
        self.publish_phase();
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.session.set_open();
                self.publish_phase();
                info!(endpoint = %self.config.server.endpoint, "connected");
            }
            TransportEvent::Message(payload) => self.dispatch_message(&payload),
            TransportEvent::Closed { code, reason } => {
                info!(code, %reason, "connection closed");
                self.handle_connection_lost();
            }
            TransportEvent::Error(info) => {
                warn!(error = %info, "transport error");
                self.handle_connection_lost();
            }
        }
    }

    /// Decode one inbound message and dispatch it
    fn dispatch_message(&mut self, payload: &[u8]) {
        if !self.session.phase().is_open() {
            debug!("message before handshake completed, discarding");
            return;
        }

        match event::decode_event(payload) {
            Ok(StreamEvent::TrainingUpdate(metrics)) | Ok(StreamEvent::EpochComplete(metrics)) => {
                self.handlers.update(metrics);
            }
            Ok(StreamEvent::TrainingComplete(result)) => {
                self.handlers.complete(result);
                // The run is over; close from our side like a caller stop,
                // but settle as finished rather than idle.
                self.drop_transport();
                self.session.set_terminal();
                self.publish_phase();
                info!("run complete, session closed");
            }
            Ok(StreamEvent::ServerError(err)) => {
                self.handlers.error(StreamError::Server {
                    message: err.message,
                });
            }
            Ok(StreamEvent::Unknown) => {
                debug!("unhandled message type, discarding");
            }
            Err(error) => {
                warn!(%error, "discarding undecodable message");
            }
        }
    }

    /// The transport dropped while the session was live
    fn handle_connection_lost(&mut self) {
        self.drop_transport();

        match self.session.connection_lost() {
            LossDecision::Retry => {
                info!(
                    attempt = self.session.attempts(),
                    max = self.config.reconnect.max_attempts,
                    delay_ms = self.config.reconnect.delay_ms,
                    "connection lost, retrying"
                );
                self.retry_at = Some(Instant::now() + self.config.reconnect.delay());
            }
            LossDecision::GiveUp => {
                warn!(
                    attempts = self.session.attempts(),
                    "connection attempts exhausted"
                );
                self.handlers.error(StreamError::RetriesExhausted {
                    attempts: self.session.attempts(),
                });
            }
        }
        self.publish_phase();
    }

    fn publish_phase(&self) {
        *self.phase.write() = self.session.phase();
    }
}
