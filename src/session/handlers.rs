//! Caller-registered event handlers
//!
//! The caller supplies callbacks at connect time. Overrides are partial: a
//! handler left unset keeps whatever the session already had, which starts
//! out as a no-op for every kind.

use thiserror::Error;

use crate::event::{MetricsUpdate, TrainingComplete};

/// Failure surfaced to the caller through the error handler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// The server reported an application-level failure
    #[error("server error: {message}")]
    Server { message: String },
    /// Every connection attempt was used without reaching the server
    #[error("gave up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },
}

type UpdateFn = Box<dyn FnMut(MetricsUpdate) + Send>;
type CompleteFn = Box<dyn FnMut(TrainingComplete) + Send>;
type ErrorFn = Box<dyn FnMut(StreamError) + Send>;

/// Caller-supplied handler overrides
#[derive(Default)]
pub struct EventHandlers {
    on_update: Option<UpdateFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
}

impl EventHandlers {
    /// Create an empty override set
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive metric updates (`training_update` and `epoch_complete`)
    pub fn on_update(mut self, f: impl FnMut(MetricsUpdate) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    /// Receive the final payload of a finished run
    pub fn on_complete(mut self, f: impl FnMut(TrainingComplete) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Receive server-reported and connection-level failures
    pub fn on_error(mut self, f: impl FnMut(StreamError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// The resolved handler set the session dispatches into
pub(crate) struct HandlerSet {
    on_update: UpdateFn,
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self {
            on_update: Box::new(|_| {}),
            on_complete: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }
}

impl HandlerSet {
    /// Merge caller overrides over the current set
    pub fn apply(&mut self, overrides: EventHandlers) {
        if let Some(f) = overrides.on_update {
            self.on_update = f;
        }
        if let Some(f) = overrides.on_complete {
            self.on_complete = f;
        }
        if let Some(f) = overrides.on_error {
            self.on_error = f;
        }
    }

    pub fn update(&mut self, metrics: MetricsUpdate) {
        (self.on_update)(metrics)
    }

    pub fn complete(&mut self, payload: TrainingComplete) {
        (self.on_complete)(payload)
    }

    pub fn error(&mut self, error: StreamError) {
        (self.on_error)(error)
    }
}
