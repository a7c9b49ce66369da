//! SoH Prediction Pipeline
//!
//! Composes feature extraction, the fallback and external estimators, the
//! recommendation engine and the prediction ledger into two flows:
//! - creation: analytic estimate when a battery is registered
//! - explain: external, explainable estimate on demand

mod config;
mod locks;
mod orchestrator;

pub use config::{open_ledger, LedgerBackend, LedgerConfig, PipelineConfig};
pub use locks::{BatteryGuard, BatteryLocks};
pub use orchestrator::{CreatedBattery, ExplainStage, Explanation, Pipeline};

use feature_engine::FeatureError;
use inference_engine::InferenceError;
use storage::StorageError;
use thiserror::Error;

/// Caller-facing pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No telemetry available for battery {0}")]
    NoTelemetry(String),
    #[error(transparent)]
    Estimator(#[from] InferenceError),
    #[error("Ledger write failed: {0}")]
    LedgerWrite(StorageError),
    #[error("Ledger read failed: {0}")]
    LedgerRead(StorageError),
    #[error("Telemetry store error: {0}")]
    Store(StorageError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NoTelemetry(_) => "no_telemetry",
            PipelineError::Estimator(e) => e.kind(),
            PipelineError::LedgerWrite(_) => "ledger_write",
            PipelineError::LedgerRead(_) => "ledger_read",
            PipelineError::Store(StorageError::NotFound(_)) => "battery_not_found",
            PipelineError::Store(StorageError::Duplicate(_)) => "duplicate_battery",
            PipelineError::Store(StorageError::InvalidRecord(_)) => "invalid_battery",
            PipelineError::Store(_) => "store",
            PipelineError::Config(_) => "config",
        }
    }

    /// Estimator failures may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Estimator(_))
    }
}

impl From<FeatureError> for PipelineError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::NoTelemetry(id) => PipelineError::NoTelemetry(id),
            mismatch @ FeatureError::SchemaMismatch { .. } => {
                PipelineError::Config(mismatch.to_string())
            }
        }
    }
}
