//! Battery Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{error::ApiError, AppState};
use pipeline::CreatedBattery;
use storage::{BatteryRecord, NewBattery, SensorReading};

/// Response for the list endpoint
#[derive(Debug, Serialize)]
pub struct BatteryList {
    pub data: Vec<BatteryRecord>,
    pub count: usize,
}

/// Response after appending a reading
#[derive(Debug, Serialize)]
pub struct ReadingAppended {
    pub battery_id: String,
    pub readings: usize,
}

/// Register a battery and seed its first prediction
pub async fn create_battery(
    State(state): State<Arc<AppState>>,
    Json(attrs): Json<NewBattery>,
) -> Result<(StatusCode, Json<CreatedBattery>), ApiError> {
    let created = state.pipeline.create_battery(attrs).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List all batteries
pub async fn list_batteries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BatteryList>, ApiError> {
    let data = state.pipeline.batteries().list()?;
    Ok(Json(BatteryList {
        count: data.len(),
        data,
    }))
}

/// Get one battery with its sensor log
pub async fn get_battery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatteryRecord>, ApiError> {
    Ok(Json(state.pipeline.batteries().get(&id)?))
}

/// Append a sensor reading
pub async fn append_reading(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(reading): Json<SensorReading>,
) -> Result<(StatusCode, Json<ReadingAppended>), ApiError> {
    let readings = state.pipeline.batteries().append_reading(&id, reading)?;
    Ok((
        StatusCode::CREATED,
        Json(ReadingAppended {
            battery_id: id,
            readings,
        }),
    ))
}
