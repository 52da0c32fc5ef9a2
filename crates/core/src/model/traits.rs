//! Seams for the two heavy compute models.
//!
//! Both traits are blocking. They are only ever called from the
//! [`JobRunner`](crate::runner::JobRunner)'s dedicated worker thread, never
//! from an async task.

use std::path::{Path, PathBuf};

use super::error::ModelError;
use crate::alignment::AlignmentRequest;

/// Splits one audio file into parts.
pub trait Separator: Send + Sync {
    /// Implementation name for logs.
    fn name(&self) -> &str;

    /// Separate `input`, writing raw output files into `output_dir` (which
    /// may not exist yet). Returns the produced files in part order.
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, ModelError>;
}

/// Aligns lyric text against audio.
pub trait Aligner: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the aligner's timing structure untouched.
    fn align(&self, request: &AlignmentRequest) -> Result<serde_json::Value, ModelError>;
}
