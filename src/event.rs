//! Inbound event decoding
//!
//! Each message arriving on the stream is a JSON object carrying a string
//! `type` discriminator plus event-specific fields. The discriminators match
//! the training server's wire format:
//! - `training_update`: per-batch metrics `{epoch, batch, loss, accuracy}`
//! - `epoch_complete`: end-of-epoch metrics `{epoch, loss, accuracy}`
//! - `training_complete`: final payload `{predictions}`
//! - `error`: server-side failure `{message}`
//!
//! Unrecognized discriminators are legal input and decode to
//! [`StreamEvent::Unknown`].

use serde::Deserialize;

/// A decoded inbound event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Per-batch metrics emitted while an epoch is running
    #[serde(rename = "training_update")]
    TrainingUpdate(MetricsUpdate),
    /// Metrics emitted once an epoch has finished
    #[serde(rename = "epoch_complete")]
    EpochComplete(MetricsUpdate),
    /// The run finished; carries the final predictions
    #[serde(rename = "training_complete")]
    TrainingComplete(TrainingComplete),
    /// Server-reported failure
    #[serde(rename = "error")]
    ServerError(ServerError),
    /// Any discriminator this client does not handle
    #[serde(other)]
    Unknown,
}

/// Training metrics snapshot
///
/// `training_update` carries a batch index; `epoch_complete` does not.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsUpdate {
    pub epoch: u32,
    #[serde(default)]
    pub batch: Option<u32>,
    pub loss: f64,
    pub accuracy: f64,
}

/// Final payload of a finished run
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingComplete {
    /// Sample predictions from the finished model. Kept as raw JSON; the
    /// consumer decides how to render them.
    pub predictions: serde_json::Value,
}

/// Server-reported application error
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerError {
    pub message: String,
}

/// Decode a raw inbound message
pub fn decode_event(payload: &[u8]) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_slice(payload)
}
