//! Mock aligner for testing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

use super::lock;
use super::probe::ConcurrencyProbe;
use crate::alignment::AlignmentRequest;
use crate::model::{Aligner, ModelError};

/// Mock implementation of the Aligner trait.
///
/// By default spreads each line's alignable words evenly across the line's
/// time span and returns `{"segments": [...]}`.
#[derive(Debug, Default)]
pub struct MockAligner {
    requests: Mutex<Vec<AlignmentRequest>>,
    response: Mutex<Option<Value>>,
    next_error: Mutex<Option<ModelError>>,
    panic_next: AtomicBool,
    delay_ms: AtomicU64,
    probe: ConcurrencyProbe,
}

impl MockAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }

    pub fn recorded_requests(&self) -> Vec<AlignmentRequest> {
        lock(&self.requests).clone()
    }

    /// Return `value` from every call instead of the generated timing.
    pub fn set_response(&self, value: Value) {
        *lock(&self.response) = Some(value);
    }

    pub fn fail_next(&self, error: ModelError) {
        *lock(&self.next_error) = Some(error);
    }

    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Aligner for MockAligner {
    fn name(&self) -> &str {
        "mock"
    }

    fn align(&self, request: &AlignmentRequest) -> Result<Value, ModelError> {
        let _running = self.probe.enter();
        lock(&self.requests).push(request.clone());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("mock aligner panicked");
        }
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        if let Some(ref value) = *lock(&self.response) {
            return Ok(value.clone());
        }

        Ok(spread_evenly(request))
    }
}

fn spread_evenly(request: &AlignmentRequest) -> Value {
    let segments: Vec<Value> = request
        .segments
        .iter()
        .map(|segment| {
            let words: Vec<&str> = segment.text.split_whitespace().collect();
            let step = (segment.end - segment.start) / words.len().max(1) as f64;
            let timed: Vec<Value> = words
                .iter()
                .enumerate()
                .map(|(i, word)| {
                    let start = segment.start + step * i as f64;
                    json!({ "word": word, "start": start, "end": start + step })
                })
                .collect();
            json!({
                "start": segment.start,
                "end": segment.end,
                "text": segment.text,
                "words": timed,
            })
        })
        .collect();
    json!({ "segments": segments })
}
