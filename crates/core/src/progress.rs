//! Per-invocation progress events.
//!
//! A workflow writes events into a [`ProgressSink`]; the transport drains the
//! paired receiver. Events are delivered in emission order. The sink never
//! blocks and never fails: once the receiving side is gone, events are
//! dropped so the workflow can still run to its end and clean up.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What happened.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Init,
    LoadProgress {
        read: u64,
    },
    LoadComplete {
        read: u64,
        sha256: String,
    },
    InferQueued,
    InferStart,
    /// Heartbeat. Carries nothing but its timestamp.
    InferProgress,
    InferComplete {
        hash: String,
    },
    Results {
        filenames: Vec<String>,
        hash: String,
        cache: bool,
    },
    Error {
        hash: Option<String>,
        error: String,
    },
    Alignment {
        hash: String,
        alignment: Value,
    },
}

impl EventPayload {
    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::Init => "init",
            EventPayload::LoadProgress { .. } => "load_progress",
            EventPayload::LoadComplete { .. } => "load_complete",
            EventPayload::InferQueued => "infer_queued",
            EventPayload::InferStart => "infer_start",
            EventPayload::InferProgress => "infer_progress",
            EventPayload::InferComplete { .. } => "infer_complete",
            EventPayload::Results { .. } => "results",
            EventPayload::Error { .. } => "error",
            EventPayload::Alignment { .. } => "alignment",
        }
    }

    /// Whether the stream ends with this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::Results { .. } | EventPayload::Error { .. } | EventPayload::Alignment { .. }
        )
    }

    fn fields(&self) -> Map<String, Value> {
        let value = match self {
            EventPayload::Init
            | EventPayload::InferQueued
            | EventPayload::InferStart
            | EventPayload::InferProgress => json!({}),
            EventPayload::LoadProgress { read } => json!({ "read": read }),
            EventPayload::LoadComplete { read, sha256 } => {
                json!({ "read": read, "sha256": sha256 })
            }
            EventPayload::InferComplete { hash } => json!({ "hash": hash }),
            EventPayload::Results {
                filenames,
                hash,
                cache,
            } => json!({ "filenames": filenames, "hash": hash, "cache": cache }),
            EventPayload::Error { hash, error } => json!({ "hash": hash, "error": error }),
            EventPayload::Alignment { hash, alignment } => {
                json!({ "hash": hash, "alignment": alignment })
            }
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// A timestamped event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Unix time in seconds.
    pub time: f64,
    pub payload: EventPayload,
}

impl ProgressEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            time: unix_seconds(),
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }

    /// The event's data object: payload fields plus `time`.
    pub fn to_json(&self) -> Value {
        let mut fields = self.payload.fields();
        fields.insert("time".to_string(), json!(self.time));
        Value::Object(fields)
    }
}

fn unix_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Writing half of a progress stream.
#[derive(Debug)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    detached: AtomicBool,
}

/// Create a connected sink and receiver.
pub fn progress_channel() -> (ProgressSink, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSink {
            tx,
            detached: AtomicBool::new(false),
        },
        rx,
    )
}

impl ProgressSink {
    /// Stamp and deliver an event.
    pub fn emit(&self, payload: EventPayload) {
        debug!("Progress event: {}", payload.event_type());
        if self.tx.send(ProgressEvent::new(payload)).is_err()
            && !self.detached.swap(true, Ordering::Relaxed)
        {
            info!("Progress receiver gone, continuing without a client");
        }
    }

    /// Whether the receiving side has gone away.
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }
}
