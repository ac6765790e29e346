//! # Sinks and Wire Framing
//!
//! Every record sent to a subscriber is one self-contained text frame,
//! `data: <json>\n\n`, as consumed by a Server-Sent Events connection. The
//! first frame of every connection is the connection acknowledgement.
//!
//! An [`EventSink`] is the write half of a subscriber connection. Writes must
//! never block: a sink over a broken or saturated connection fails fast and
//! the registry drops the subscriber.

use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::model::NormalizedEvent;

pub const CONNECTION_MESSAGE: &str = "Connected to event stream";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[error("subscriber connection closed")]
    Closed,
    #[error("subscriber queue is full")]
    Full,
}

pub trait EventSink: Send + Sync {
    /// Writes one framed text record.
    fn write_frame(&self, frame: &str) -> Result<(), SinkError>;
}

impl EventSink for mpsc::Sender<String> {
    fn write_frame(&self, frame: &str) -> Result<(), SinkError> {
        self.try_send(frame.to_owned()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl EventSink for mpsc::UnboundedSender<String> {
    fn write_frame(&self, frame: &str) -> Result<(), SinkError> {
        self.send(frame.to_owned()).map_err(|_| SinkError::Closed)
    }
}

fn frame(json: &str) -> String {
    format!("data: {json}\n\n")
}

/// The record that opens every subscriber stream.
pub fn connection_frame() -> String {
    let record = json!({ "type": "connection", "message": CONNECTION_MESSAGE });
    frame(&record.to_string())
}

pub fn event_frame(event: &NormalizedEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event).map(|json| frame(&json))
}
