//! Mock separator for testing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::lock;
use super::probe::ConcurrencyProbe;
use crate::model::{ModelError, Separator};

/// A recorded separation call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSeparation {
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

/// Mock implementation of the Separator trait.
///
/// Writes one small file per label into the output directory, named the way
/// audio-separator names its outputs. Can be told to fail, panic or take a
/// while.
#[derive(Debug)]
pub struct MockSeparator {
    calls: Mutex<Vec<RecordedSeparation>>,
    next_error: Mutex<Option<ModelError>>,
    panic_next: AtomicBool,
    delay_ms: AtomicU64,
    labels: Vec<String>,
    probe: ConcurrencyProbe,
}

impl Default for MockSeparator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSeparator {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            panic_next: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            labels: vec!["Vocals".to_string(), "Instrumental".to_string()],
            probe: ConcurrencyProbe::new(),
        }
    }

    /// Share overlap tracking with other mocks.
    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Produce one file per label instead of the default two.
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }

    pub fn recorded_calls(&self) -> Vec<RecordedSeparation> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: ModelError) {
        *lock(&self.next_error) = Some(error);
    }

    /// Panic inside the next call.
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Separator for MockSeparator {
    fn name(&self) -> &str {
        "mock"
    }

    fn separate(&self, input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, ModelError> {
        let _running = self.probe.enter();
        lock(&self.calls).push(RecordedSeparation {
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
        });

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("mock separator panicked");
        }
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }

        let source = std::fs::read(input)?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        std::fs::create_dir_all(output_dir)?;

        let mut produced = Vec::with_capacity(self.labels.len());
        for label in &self.labels {
            let path = output_dir.join(format!("{}_({})_mock.wav", stem, label));
            let mut contents = format!("{}:", label).into_bytes();
            contents.extend_from_slice(&source);
            std::fs::write(&path, contents)?;
            produced.push(path);
        }
        Ok(produced)
    }
}
