//! SQLite Prediction Ledger

use crate::ledger::{NewPrediction, PredictionLedger, PredictionRecord, RecordId};
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recommendation::Category;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    battery_id TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    soh REAL NOT NULL,
    attribution TEXT,
    recommendation TEXT NOT NULL,
    voltage REAL,
    temperature REAL,
    cycles INTEGER
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_predictions_battery_latest
    ON predictions (battery_id, created_at_ms DESC, id DESC)";

/// Ledger backed by a SQLite database
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Connect and create the schema if needed
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        info!("Opening SQLite prediction ledger at {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database lives and dies with its single connection
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;

        Ok(Self { pool })
    }

    fn decode(row: &SqliteRow) -> Result<PredictionRecord, StorageError> {
        let created_at_ms: i64 = row.try_get("created_at_ms")?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
            StorageError::SerializationError(format!("invalid timestamp {}", created_at_ms))
        })?;

        let attribution = row
            .try_get::<Option<String>, _>("attribution")?
            .map(|json| serde_json::from_str(&json))
            .transpose()?;

        let recommendation: String = row.try_get("recommendation")?;
        let recommendation =
            Category::from_str(&recommendation).map_err(StorageError::SerializationError)?;

        let cycles = row
            .try_get::<Option<i64>, _>("cycles")?
            .map(u32::try_from)
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        Ok(PredictionRecord {
            id: row.try_get("id")?,
            battery_id: row.try_get("battery_id")?,
            created_at,
            soh: row.try_get("soh")?,
            attribution,
            recommendation,
            voltage: row.try_get("voltage")?,
            temperature: row.try_get("temperature")?,
            cycles,
        })
    }
}

#[async_trait]
impl PredictionLedger for SqliteLedger {
    async fn append(&self, prediction: NewPrediction) -> Result<PredictionRecord, StorageError> {
        // Identifier comes from the database; validate and clamp first
        let record = prediction.into_record(0)?;
        let attribution = record
            .attribution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "INSERT INTO predictions
                (battery_id, created_at_ms, soh, attribution, recommendation, voltage, temperature, cycles)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.battery_id)
        .bind(record.created_at.timestamp_millis())
        .bind(record.soh)
        .bind(attribution)
        .bind(record.recommendation.as_str())
        .bind(record.voltage)
        .bind(record.temperature)
        .bind(record.cycles.map(i64::from))
        .execute(&self.pool)
        .await?;

        let id: RecordId = result.last_insert_rowid();
        debug!("Appended prediction {} for {}", id, record.battery_id);
        Ok(PredictionRecord { id, ..record })
    }

    async fn latest(&self, battery_id: &str) -> Result<Option<PredictionRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT id, battery_id, created_at_ms, soh, attribution, recommendation, voltage, temperature, cycles
             FROM predictions
             WHERE battery_id = ?
             ORDER BY created_at_ms DESC, id DESC
             LIMIT 1",
        )
        .bind(battery_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn exists(&self, battery_id: &str) -> Result<bool, StorageError> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM predictions WHERE battery_id = ?)",
        )
        .bind(battery_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(found != 0)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM predictions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}
