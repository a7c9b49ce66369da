//! Pipeline configuration

use feature_engine::FeatureProfile;
use inference_engine::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{MemoryLedger, PredictionLedger, SqliteLedger, StorageError};
use tracing::info;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Profile the feature extractor produces; must match the estimator's
    pub feature_profile: FeatureProfile,
    /// External estimator process
    pub estimator: BridgeConfig,
    /// Retry once when the estimator times out
    pub retry_on_timeout: bool,
    /// Prediction ledger backend
    pub ledger: LedgerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feature_profile: FeatureProfile::Extended,
            estimator: BridgeConfig::default(),
            retry_on_timeout: true,
            ledger: LedgerConfig::default(),
        }
    }
}

/// Ledger storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// SQLite URL, used by the sqlite backend
    pub database_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            database_url: "sqlite://predictions.db".to_string(),
        }
    }
}

/// Open the configured ledger backend
pub async fn open_ledger(config: &LedgerConfig) -> Result<Arc<dyn PredictionLedger>, StorageError> {
    info!("Opening {:?} prediction ledger", config.backend);
    Ok(match config.backend {
        LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::connect(&config.database_url).await?),
    })
}
