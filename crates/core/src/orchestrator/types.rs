//! Types for the workflow orchestrator.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::alignment::{AlignmentRequest, ReferenceTrack, UnknownReference};
use crate::digest::{ContentDigest, DigestParseError};

/// Why an alignment request was refused before any work started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RejectReason {
    /// `input_hash` is not a well-formed digest.
    #[error("invalid input_hash: {0}")]
    InvalidDigest(#[from] DigestParseError),

    #[error("{0}")]
    UnknownReference(#[from] UnknownReference),

    /// No cached stem exists for the digest.
    #[error("no cached separation for {0}")]
    NotCached(String),
}

/// How one workflow invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Served from the result cache.
    Cached,
    Completed,
    Failed,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Cached => "cached",
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
        }
    }
}

/// A validated alignment request, ready to queue.
#[derive(Debug, Clone)]
pub struct PreparedAlignment {
    pub digest: ContentDigest,
    pub reference: ReferenceTrack,
    pub request: AlignmentRequest,
}

impl PreparedAlignment {
    pub fn audio_path(&self) -> &PathBuf {
        &self.request.audio_path
    }
}
