//! Pipeline Orchestrator

use crate::config::PipelineConfig;
use crate::locks::BatteryLocks;
use crate::PipelineError;
use chrono::Utc;
use feature_engine::{FeatureExtractor, FeatureVector};
use inference_engine::{Inference, InferenceBridge, InferenceError, ProcessOutput};
use recommendation::{Auxiliary, Category, RecommendationEngine};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use storage::{
    BatteryRecord, BatteryRepository, NewBattery, NewPrediction, PredictionLedger,
    PredictionRecord, RecordId, StorageError,
};
use tracing::{debug, info, warn};

/// Stages of the on-demand explain flow, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExplainStage {
    Idle,
    Extracting,
    Invoking,
    Validating,
    Classifying,
    Persisted,
    Failed,
}

/// Tracks one explain run; stages only move forward
struct ExplainRun<'a> {
    battery_id: &'a str,
    stage: ExplainStage,
    started: Instant,
}

impl<'a> ExplainRun<'a> {
    fn new(battery_id: &'a str) -> Self {
        Self {
            battery_id,
            stage: ExplainStage::Idle,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: ExplainStage) {
        debug_assert!(
            next > self.stage && self.stage != ExplainStage::Failed,
            "illegal transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!("Explain {}: {:?} -> {:?}", self.battery_id, self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        warn!(
            "Explain {} failed while {:?} after {}ms: {}",
            self.battery_id,
            self.stage,
            self.started.elapsed().as_millis(),
            err
        );
        metrics::counter!("soh_explain_failures_total", "kind" => err.kind()).increment(1);
        self.stage = ExplainStage::Failed;
        err
    }
}

/// Result of the creation flow
#[derive(Debug, Clone, Serialize)]
pub struct CreatedBattery {
    pub battery: BatteryRecord,
    pub initial_prediction: PredictionRecord,
}

/// Result of the explain flow
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub battery_id: String,
    pub record_id: RecordId,
    pub soh: f64,
    pub attribution: Option<BTreeMap<String, f64>>,
    pub recommendation: Category,
    pub advice: String,
}

/// SoH prediction orchestrator. Sole writer of prediction records.
pub struct Pipeline {
    batteries: Arc<BatteryRepository>,
    ledger: Arc<dyn PredictionLedger>,
    extractor: FeatureExtractor,
    bridge: InferenceBridge,
    recommender: RecommendationEngine,
    locks: BatteryLocks,
    retry_on_timeout: bool,
}

impl Pipeline {
    /// Build a pipeline. Fails if the extractor and estimator disagree on the
    /// feature schema.
    pub fn new(
        config: &PipelineConfig,
        batteries: Arc<BatteryRepository>,
        ledger: Arc<dyn PredictionLedger>,
    ) -> Result<Self, PipelineError> {
        let extractor = FeatureExtractor::new(config.feature_profile);
        extractor
            .schema()
            .ensure_compatible(&config.estimator.schema())?;

        info!(
            "Creating SoH pipeline: schema={} retry_on_timeout={}",
            extractor.schema(),
            config.retry_on_timeout
        );

        Ok(Self {
            batteries,
            ledger,
            extractor,
            bridge: InferenceBridge::new(config.estimator.clone()),
            recommender: RecommendationEngine::default(),
            locks: BatteryLocks::new(),
            retry_on_timeout: config.retry_on_timeout,
        })
    }

    /// Register a battery and seed its history with an analytic estimate.
    /// The battery is unregistered again if the seed cannot be recorded.
    pub async fn create_battery(&self, mut attrs: NewBattery) -> Result<CreatedBattery, PipelineError> {
        let id = self.batteries.assign_id(&attrs).map_err(PipelineError::Store)?;
        let _guard = self.locks.acquire(&id).await;

        attrs.id = Some(id);
        let battery = self.batteries.create(attrs).map_err(PipelineError::Store)?;
        let registration = Registration::new(&self.batteries, &battery.id);

        let inputs = fallback::FallbackInputs::from(&battery);
        let estimate = fallback::estimate(&inputs);
        let recommendation = self.recommender.recommend(estimate.soh, &inputs.auxiliary());

        let prediction = NewPrediction {
            battery_id: battery.id.clone(),
            created_at: Utc::now(),
            soh: estimate.soh,
            attribution: None,
            recommendation,
            voltage: None,
            temperature: None,
            cycles: Some(battery.cycles),
        };

        let initial_prediction = self.persist(prediction).await?;
        registration.commit();
        metrics::counter!("soh_predictions_total", "flow" => "creation").increment(1);
        info!(
            "Battery {} registered with soh={:.2} ({})",
            battery.id, initial_prediction.soh, recommendation
        );

        Ok(CreatedBattery {
            battery,
            initial_prediction,
        })
    }

    /// Run the external estimator on the latest reading and record the result.
    /// Nothing is written unless every stage succeeds.
    pub async fn explain_latest(&self, battery_id: &str) -> Result<Explanation, PipelineError> {
        let _guard = self.locks.acquire(battery_id).await;
        let mut run = ExplainRun::new(battery_id);

        run.advance(ExplainStage::Extracting);
        let battery = match self.batteries.get(battery_id) {
            Ok(battery) => battery,
            Err(StorageError::NotFound(_)) => {
                return Err(run.fail(PipelineError::NoTelemetry(battery_id.to_string())));
            }
            Err(e) => return Err(run.fail(PipelineError::Store(e))),
        };
        let features = self
            .extractor
            .extract(&battery)
            .map_err(|e| run.fail(e.into()))?;

        run.advance(ExplainStage::Invoking);
        let output = self
            .run_estimator(&features)
            .await
            .map_err(|e| run.fail(e.into()))?;

        run.advance(ExplainStage::Validating);
        let inference = Inference::from_output(output).map_err(|e| run.fail(e.into()))?;
        metrics::histogram!("soh_inference_latency_ms").record(inference.latency_ms as f64);

        run.advance(ExplainStage::Classifying);
        let recommendation = self.recommender.recommend(inference.soh, &auxiliary(&battery));

        let prediction = NewPrediction {
            battery_id: battery.id.clone(),
            created_at: Utc::now(),
            soh: inference.soh,
            attribution: inference.attribution,
            recommendation,
            voltage: features.snapshot.voltage,
            temperature: features.snapshot.temperature,
            cycles: Some(features.snapshot.cycles),
        };
        let record = self.persist(prediction).await.map_err(|e| run.fail(e))?;

        run.advance(ExplainStage::Persisted);
        metrics::counter!("soh_predictions_total", "flow" => "explain").increment(1);
        info!(
            "Explained {}: soh={:.2} ({}) in {}ms",
            battery_id,
            record.soh,
            recommendation,
            run.started.elapsed().as_millis()
        );

        Ok(Explanation {
            battery_id: record.battery_id,
            record_id: record.id,
            soh: record.soh,
            attribution: record.attribution,
            recommendation,
            advice: recommendation.advice().to_string(),
        })
    }

    /// Most recent prediction for a battery
    pub async fn latest_prediction(
        &self,
        battery_id: &str,
    ) -> Result<Option<PredictionRecord>, PipelineError> {
        let _guard = self.locks.acquire(battery_id).await;
        self.ledger
            .latest(battery_id)
            .await
            .map_err(PipelineError::LedgerRead)
    }

    /// Whether a battery has any prediction. Waits for an in-flight write.
    pub async fn prediction_exists(&self, battery_id: &str) -> Result<bool, PipelineError> {
        let _guard = self.locks.acquire(battery_id).await;
        self.ledger
            .exists(battery_id)
            .await
            .map_err(PipelineError::LedgerRead)
    }

    /// Total number of predictions
    pub async fn prediction_count(&self) -> Result<usize, PipelineError> {
        self.ledger.count().await.map_err(PipelineError::LedgerRead)
    }

    /// Telemetry store
    pub fn batteries(&self) -> &BatteryRepository {
        &self.batteries
    }

    /// Run the estimator, retrying once on timeout when enabled
    async fn run_estimator(&self, features: &FeatureVector) -> Result<ProcessOutput, InferenceError> {
        match self.bridge.run(features).await {
            Err(e) if e.is_transient() && self.retry_on_timeout => {
                warn!("Estimator attempt failed ({}), retrying once", e);
                metrics::counter!("soh_estimator_retries_total").increment(1);
                self.bridge.run(features).await
            }
            result => result,
        }
    }

    async fn persist(&self, prediction: NewPrediction) -> Result<PredictionRecord, PipelineError> {
        self.ledger
            .append(prediction)
            .await
            .map_err(PipelineError::LedgerWrite)
    }
}

/// Unregisters a freshly created battery unless committed, covering both a
/// failed seed write and a dropped creation future
struct Registration<'a> {
    batteries: &'a BatteryRepository,
    battery_id: &'a str,
    committed: bool,
}

impl<'a> Registration<'a> {
    fn new(batteries: &'a BatteryRepository, battery_id: &'a str) -> Self {
        Self {
            batteries,
            battery_id,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        warn!("Seed prediction for {} not recorded, unregistering", self.battery_id);
        if let Err(e) = self.batteries.remove(self.battery_id) {
            warn!("Failed to unregister {}: {}", self.battery_id, e);
        }
    }
}

fn auxiliary(battery: &BatteryRecord) -> Auxiliary {
    Auxiliary {
        internal_resistance: battery.internal_resistance,
        calendar_age: battery.calendar_age,
    }
}
