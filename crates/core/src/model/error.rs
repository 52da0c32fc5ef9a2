//! Error types for the model adapters.

use thiserror::Error;

/// Failure of a compute call, as seen by the orchestrator.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The external program could not be started.
    #[error("Model command not found: {program}")]
    CommandNotFound { program: String },

    /// The external program ran and reported failure.
    #[error("Model command failed: {reason}")]
    CommandFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The program succeeded but its output could not be used.
    #[error("Invalid model output: {reason}")]
    InvalidOutput { reason: String },

    /// The separator finished without producing any file.
    #[error("Model produced no output files")]
    NoOutput,

    /// The worker panicked. Carries the panic message.
    #[error("Model worker panicked: {0}")]
    Panicked(String),

    /// The worker went away without reporting a result.
    #[error("Model worker exited without a result")]
    WorkerLost,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub fn command_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::CommandFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn invalid_output(reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            reason: reason.into(),
        }
    }
}
