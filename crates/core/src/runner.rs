//! Background execution of heavy compute calls.
//!
//! Each call gets its own OS thread. The thread hands exactly one value back
//! over a oneshot channel; the async caller waits on that channel interleaved
//! with a fixed-interval ticker and fires a heartbeat every N ticks while the
//! thread is still working.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::JobsConfig;
use crate::metrics::{HEARTBEATS_TOTAL, JOB_DURATION};
use crate::model::ModelError;

/// What kind of heavy job is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Separate,
    Align,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Separate => "separate",
            JobKind::Align => "align",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs blocking jobs off the async runtime.
#[derive(Debug, Clone)]
pub struct JobRunner {
    poll_interval: Duration,
    heartbeat_ticks: u32,
}

impl JobRunner {
    pub fn new(poll_interval: Duration, heartbeat_ticks: u32) -> Self {
        Self {
            poll_interval,
            heartbeat_ticks: heartbeat_ticks.max(1),
        }
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            config.heartbeat_ticks,
        )
    }

    /// Heartbeat cadence.
    pub fn heartbeat_interval(&self) -> Duration {
        self.poll_interval * self.heartbeat_ticks
    }

    /// Run `job` on a dedicated thread and wait for its result.
    ///
    /// `on_heartbeat` is called every `heartbeat_ticks` polling ticks for as
    /// long as the job has not reported back. A panic inside `job` comes back
    /// as [`ModelError::Panicked`]. No retries.
    pub async fn run<T, F, H>(
        &self,
        kind: JobKind,
        job: F,
        mut on_heartbeat: H,
    ) -> Result<T, ModelError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ModelError> + Send + 'static,
        H: FnMut(),
    {
        let (tx, mut rx) = oneshot::channel();
        let started = Instant::now();

        std::thread::Builder::new()
            .name(format!("jellysing-{}", kind))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(job))
                    .unwrap_or_else(|payload| Err(ModelError::Panicked(panic_message(&*payload))));
                if tx.send(result).is_err() {
                    debug!("{} job finished after its caller went away", kind);
                }
            })?;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut ticks: u32 = 0;
        let result = loop {
            tokio::select! {
                biased;
                received = &mut rx => {
                    break received.unwrap_or(Err(ModelError::WorkerLost));
                }
                _ = ticker.tick() => {
                    ticks = ticks.wrapping_add(1);
                    if ticks % self.heartbeat_ticks == 0 {
                        HEARTBEATS_TOTAL.inc();
                        on_heartbeat();
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        JOB_DURATION
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());
        match &result {
            Ok(_) => debug!("{} job finished in {:?}", kind, elapsed),
            Err(e) => warn!("{} job failed after {:?}: {}", kind, elapsed, e),
        }
        result
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
