//! Storage Layer
//!
//! Battery telemetry store plus the append-only prediction ledger, with
//! in-memory and SQLite ledger backends.

mod battery;
mod ledger;
mod sqlite;

pub use battery::{BatteryRecord, BatteryRepository, BatteryStatus, NewBattery, SensorReading};
pub use ledger::{MemoryLedger, NewPrediction, PredictionLedger, PredictionRecord, RecordId};
pub use sqlite::SqliteLedger;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Duplicate identifier: {0}")]
    Duplicate(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
