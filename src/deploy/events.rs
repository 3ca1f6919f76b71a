//! Progress events and the emitter that feeds the streaming response.
//!
//! Wire format: one JSON object per line,
//! `{"type":"progress","message":"...","percentage":40,"timestamp":"..."}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Log,
    Progress,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: EventKind, message: impl Into<String>, percentage: Option<u8>) -> Self {
        Self {
            kind,
            message: message.into(),
            percentage,
            timestamp: Utc::now(),
        }
    }

    /// Newline-terminated JSON line.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|err| {
            tracing::error!("Failed to serialize progress event: {}", err);
            String::from(r#"{"type":"error","message":"unserializable event"}"#)
        });
        line.push('\n');
        line
    }
}

pub type EventStream = UnboundedReceiverStream<ProgressEvent>;

/// Producer half. Sending never blocks and never fails the run:
/// a disconnected client only stops receiving.
#[derive(Debug)]
pub struct ProgressEmitter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last_percentage: u8,
    detached: bool,
}

pub fn channel() -> (ProgressEmitter, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressEmitter {
            tx,
            last_percentage: 0,
            detached: false,
        },
        UnboundedReceiverStream::new(rx),
    )
}

impl ProgressEmitter {
    fn send(&mut self, event: ProgressEvent) {
        if self.tx.send(event).is_err() && !self.detached {
            self.detached = true;
            tracing::warn!("Progress stream receiver gone, run continues without a client");
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.send(ProgressEvent::new(EventKind::Log, message, None));
    }

    /// Percentages never go backwards within a run.
    pub fn progress(&mut self, message: impl Into<String>, percentage: u8) {
        let percentage = percentage.min(100).max(self.last_percentage);
        self.last_percentage = percentage;
        self.send(ProgressEvent::new(
            EventKind::Progress,
            message,
            Some(percentage),
        ));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.send(ProgressEvent::new(EventKind::Warning, message, None));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.send(ProgressEvent::new(EventKind::Error, message, None));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.send(ProgressEvent::new(EventKind::Success, message, None));
    }

    pub fn last_percentage(&self) -> u8 {
        self.last_percentage
    }

    /// True once a send found the receiving side gone.
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}
