//! Process-wide admission control for heavy compute.
//!
//! One slot, shared by separation and alignment. Waiters are served in
//! arrival order (tokio's semaphore is fair). The slot is released when the
//! [`AdmissionPermit`] drops, whatever the job's outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::metrics::{ADMISSION_QUEUED, ADMISSION_RUNNING};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("admission gate is closed")]
pub struct GateClosed;

/// Snapshot of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    pub queued: usize,
    pub running: usize,
}

#[derive(Debug, Default)]
struct GateCounters {
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Single-slot FIFO gate.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    counters: Arc<GateCounters>,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Wait for the slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, GateClosed> {
        let queued = QueuedGuard::enter(&self.counters);
        let acquired = Arc::clone(&self.semaphore).acquire_owned().await;
        drop(queued);

        let permit = acquired.map_err(|_| GateClosed)?;
        self.counters.running.fetch_add(1, Ordering::SeqCst);
        ADMISSION_RUNNING.inc();
        debug!("Admission slot granted");

        Ok(AdmissionPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Refuse all current and future waiters. Used at shutdown.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn status(&self) -> GateStatus {
        GateStatus {
            queued: self.counters.queued.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
        }
    }
}

/// Counts a waiter for as long as it waits, including when the waiting
/// future is dropped early.
struct QueuedGuard<'a>(&'a GateCounters);

impl<'a> QueuedGuard<'a> {
    fn enter(counters: &'a GateCounters) -> Self {
        counters.queued.fetch_add(1, Ordering::SeqCst);
        ADMISSION_QUEUED.inc();
        Self(counters)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::SeqCst);
        ADMISSION_QUEUED.dec();
    }
}

/// Holding this means holding the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<GateCounters>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
        ADMISSION_RUNNING.dec();
        debug!("Admission slot released");
    }
}
