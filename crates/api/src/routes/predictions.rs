//! Prediction Routes

use axum::{
    extract::{Path, State},
    Json,
};
use recommendation::Category;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{error::ApiError, AppState};
use storage::{PredictionRecord, RecordId};

/// Response for the explain endpoint
#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub prediction: f64,
    pub shap: Option<BTreeMap<String, f64>>,
    /// Advice text
    pub recommendation: String,
    pub category: Category,
    pub record_id: RecordId,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub battery_id: String,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub battery_id: String,
    pub soh: f64,
    pub category: Category,
    pub text: String,
}

/// Run the explainable estimator on the latest reading
pub async fn explain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let explanation = state.pipeline.explain_latest(&id).await?;
    Ok(Json(ExplainResponse {
        prediction: explanation.soh,
        shap: explanation.attribution,
        recommendation: explanation.advice,
        category: explanation.recommendation,
        record_id: explanation.record_id,
    }))
}

/// Most recent prediction
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PredictionRecord>, ApiError> {
    latest_record(&state, &id).await.map(Json)
}

/// Narration text for the most recent prediction
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let record = latest_record(&state, &id).await?;
    Ok(Json(SummaryResponse {
        text: record.summary(),
        battery_id: record.battery_id,
        soh: record.soh,
        category: record.recommendation,
    }))
}

/// Whether any prediction exists
pub async fn exists(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let exists = state.pipeline.prediction_exists(&id).await?;
    Ok(Json(ExistsResponse {
        battery_id: id,
        exists,
    }))
}

async fn latest_record(state: &AppState, id: &str) -> Result<PredictionRecord, ApiError> {
    state
        .pipeline
        .latest_prediction(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No prediction found for battery {}", id)))
}
