//! Feature Engineering Engine
//!
//! Projects the most recent sensor reading of a battery onto the fixed
//! feature profile an estimator was configured for.

mod features;
mod profile;

pub use features::{FeatureExtractor, FeatureVector, ReadingSnapshot};
pub use profile::{FeatureProfile, FeatureSchema, SCHEMA_VERSION};

use thiserror::Error;

/// Errors during feature extraction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("No telemetry available for battery {0}")]
    NoTelemetry(String),
    #[error("Feature schema mismatch: extractor produces {extractor}, estimator expects {estimator}")]
    SchemaMismatch {
        extractor: FeatureSchema,
        estimator: FeatureSchema,
    },
}
