//! Prediction Ledger
//!
//! Append-only history of SoH predictions. Records are never updated or
//! deleted once written.

use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use recommendation::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

/// Ledger-assigned record identifier, increasing with insertion order
pub type RecordId = i64;

/// A persisted prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: RecordId,
    pub battery_id: String,
    pub created_at: DateTime<Utc>,
    /// State of health, clamped to [0, 100]
    pub soh: f64,
    /// Feature name to contribution weight
    pub attribution: Option<BTreeMap<String, f64>>,
    pub recommendation: Category,
    /// Voltage used for the estimate
    pub voltage: Option<f64>,
    /// Temperature used for the estimate
    pub temperature: Option<f64>,
    /// Cycle count used for the estimate
    pub cycles: Option<u32>,
}

impl PredictionRecord {
    /// One-line summary suitable for narration
    pub fn summary(&self) -> String {
        format!(
            "Battery {} has a health of {} percent. {}",
            self.battery_id,
            self.soh.round(),
            self.recommendation.advice()
        )
    }
}

/// A prediction about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub battery_id: String,
    pub created_at: DateTime<Utc>,
    pub soh: f64,
    pub attribution: Option<BTreeMap<String, f64>>,
    pub recommendation: Category,
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub cycles: Option<u32>,
}

impl NewPrediction {
    /// Validate and clamp, assigning the record identifier. Timestamps keep
    /// millisecond precision, the resolution every backend stores.
    pub fn into_record(self, id: RecordId) -> Result<PredictionRecord, StorageError> {
        if !self.soh.is_finite() {
            return Err(StorageError::InvalidRecord(format!(
                "soh {} is not a finite number",
                self.soh
            )));
        }

        Ok(PredictionRecord {
            id,
            battery_id: self.battery_id,
            created_at: self.created_at.trunc_subsecs(3),
            soh: self.soh.clamp(0.0, 100.0),
            attribution: self.attribution,
            recommendation: self.recommendation,
            voltage: self.voltage,
            temperature: self.temperature,
            cycles: self.cycles,
        })
    }
}

/// Append-only prediction store
#[async_trait]
pub trait PredictionLedger: Send + Sync {
    /// Append a prediction and return the record as stored
    async fn append(&self, prediction: NewPrediction) -> Result<PredictionRecord, StorageError>;

    /// Most recent prediction for a battery. Ties on `created_at` go to the
    /// later insertion.
    async fn latest(&self, battery_id: &str) -> Result<Option<PredictionRecord>, StorageError>;

    /// Whether any prediction exists for a battery
    async fn exists(&self, battery_id: &str) -> Result<bool, StorageError>;

    /// Total number of predictions
    async fn count(&self) -> Result<usize, StorageError>;
}

#[derive(Default)]
struct LedgerState {
    records: Vec<PredictionRecord>,
    /// Battery id to index of its latest record
    latest: HashMap<String, usize>,
}

/// In-memory ledger
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        info!("Creating in-memory prediction ledger");
        Self {
            state: Mutex::new(LedgerState::default()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PredictionLedger for MemoryLedger {
    async fn append(&self, prediction: NewPrediction) -> Result<PredictionRecord, StorageError> {
        let mut state = self.state.lock().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        let index = state.records.len();
        let record = prediction.into_record(index as RecordId + 1)?;

        let newer = match state.latest.get(&record.battery_id) {
            Some(&current) => state.records[current].created_at <= record.created_at,
            None => true,
        };
        if newer {
            state.latest.insert(record.battery_id.clone(), index);
        }

        debug!("Appended prediction {} for {}", record.id, record.battery_id);
        state.records.push(record.clone());
        Ok(record)
    }

    async fn latest(&self, battery_id: &str) -> Result<Option<PredictionRecord>, StorageError> {
        let state = self.state.lock().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        Ok(state
            .latest
            .get(battery_id)
            .map(|&index| state.records[index].clone()))
    }

    async fn exists(&self, battery_id: &str) -> Result<bool, StorageError> {
        let state = self.state.lock().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        Ok(state.latest.contains_key(battery_id))
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let state = self.state.lock().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        Ok(state.records.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn prediction(battery_id: &str, soh: f64, created_at: DateTime<Utc>) -> NewPrediction {
        NewPrediction {
            battery_id: battery_id.to_string(),
            created_at,
            soh,
            attribution: None,
            recommendation: recommendation::recommend(soh.clamp(0.0, 100.0), &Default::default()),
            voltage: Some(3.7),
            temperature: Some(25.0),
            cycles: Some(120),
        }
    }

    #[tokio::test]
    async fn test_latest_after_sequential_appends() {
        let ledger = MemoryLedger::new();
        let start = Utc::now();

        for i in 0..5 {
            ledger
                .append(prediction("BATT-1000", 90.0 - i as f64, start + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let latest = ledger.latest("BATT-1000").await.unwrap().unwrap();
        assert_eq!(latest.id, 5);
        assert_eq!(latest.soh, 86.0);
        assert!(ledger.exists("BATT-1000").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_returns_stored_record() {
        let ledger = MemoryLedger::new();
        let appended = ledger
            .append(prediction("BATT-1000", 120.0, Utc::now()))
            .await
            .unwrap();

        assert_eq!(appended.soh, 100.0);
        assert_eq!(appended.created_at.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(ledger.latest("BATT-1000").await.unwrap(), Some(appended));
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = MemoryLedger::new();
        assert!(ledger.latest("BATT-1000").await.unwrap().is_none());
        assert!(!ledger.exists("BATT-1000").await.unwrap());
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timestamp_tie_goes_to_last_insert() {
        let ledger = MemoryLedger::new();
        let at = Utc::now();

        ledger.append(prediction("BATT-1000", 80.0, at)).await.unwrap();
        let second = ledger.append(prediction("BATT-1000", 70.0, at)).await.unwrap().id;

        let latest = ledger.latest("BATT-1000").await.unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.soh, 70.0);
    }

    #[tokio::test]
    async fn test_older_timestamp_does_not_replace_latest() {
        let ledger = MemoryLedger::new();
        let at = Utc::now();

        let first = ledger.append(prediction("BATT-1000", 80.0, at)).await.unwrap().id;
        ledger
            .append(prediction("BATT-1000", 60.0, at - Duration::minutes(5)))
            .await
            .unwrap();

        let latest = ledger.latest("BATT-1000").await.unwrap().unwrap();
        assert_eq!(latest.id, first);
        assert_eq!(ledger.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batteries_are_independent() {
        let ledger = MemoryLedger::new();
        ledger.append(prediction("BATT-1000", 80.0, Utc::now())).await.unwrap();

        assert!(ledger.exists("BATT-1000").await.unwrap());
        assert!(!ledger.exists("BATT-2000").await.unwrap());
    }

    #[tokio::test]
    async fn test_soh_clamped_and_nan_rejected() {
        let ledger = MemoryLedger::new();
        ledger.append(prediction("BATT-1000", 104.2, Utc::now())).await.unwrap();
        let latest = ledger.latest("BATT-1000").await.unwrap().unwrap();
        assert_eq!(latest.soh, 100.0);

        let mut bad = prediction("BATT-1000", 50.0, Utc::now());
        bad.soh = f64::NAN;
        assert!(matches!(
            ledger.append(bad).await,
            Err(StorageError::InvalidRecord(_))
        ));
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[test]
    fn test_summary_text() {
        let record = prediction("BATT-1000", 82.4, Utc::now()).into_record(1).unwrap();
        assert_eq!(
            record.summary(),
            "Battery BATT-1000 has a health of 82 percent. Battery is healthy. No immediate action required."
        );
    }
}
