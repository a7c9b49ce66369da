//! External Inference Bridge
//!
//! Runs one short-lived estimator process per request, bounded by a
//! wall-clock budget, and validates its output contract.

mod bridge;
mod output;

pub use bridge::{BridgeConfig, InferenceBridge, ProcessOutput};
pub use output::Inference;

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to launch estimator: {0}")]
    Spawn(String),
    #[error("Estimator I/O failed: {0}")]
    Io(String),
    #[error("Failed to encode features: {0}")]
    Encode(String),
    #[error("Estimator exited with status {code:?}: {stderr}")]
    ProcessExit { code: Option<i32>, stderr: String },
    #[error("Estimator wrote to stderr: {0}")]
    ProcessStderr(String),
    #[error("Invalid estimator output: {0}")]
    OutputParse(String),
    #[error("Estimator timed out after {0}ms")]
    Timeout(u64),
}

impl InferenceError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Spawn(_) => "process_spawn",
            InferenceError::Io(_) => "process_io",
            InferenceError::Encode(_) => "feature_encode",
            InferenceError::ProcessExit { .. } => "process_exit",
            InferenceError::ProcessStderr(_) => "process_stderr",
            InferenceError::OutputParse(_) => "output_parse",
            InferenceError::Timeout(_) => "timeout",
        }
    }

    /// Only a timeout is worth an automatic retry
    pub fn is_transient(&self) -> bool {
        matches!(self, InferenceError::Timeout(_))
    }
}
