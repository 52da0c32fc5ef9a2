//! Workflow orchestrator.
//!
//! Composes upload spooling, the result cache, the admission gate and the job
//! runner into the two public workflows:
//! - **Separate**: upload, hash, serve from cache or run the separator once
//!   the compute slot is free, then materialize the parts into the cache.
//! - **Align**: validate a reference to a cached separation, queue for the
//!   compute slot, run the aligner.
//!
//! Both workflows report through a [`ProgressSink`](crate::progress::ProgressSink)
//! and always end with exactly one terminal event.

mod types;
mod workflows;

pub use types::{JobOutcome, PreparedAlignment, RejectReason};
pub use workflows::Orchestrator;
