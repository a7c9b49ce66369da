//! Battery SoH API Server
//!
//! REST API over the battery telemetry store and the SoH prediction pipeline.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
mod routes;

pub use config::{AppConfig, ServerConfig};
pub use error::ApiError;

use pipeline::{open_ledger, Pipeline};
use storage::BatteryRepository;

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus render handle, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(pipeline: Pipeline, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub battery_count: usize,
    /// Absent when the ledger cannot be read
    pub prediction_count: Option<usize>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/batteries",
            post(routes::batteries::create_battery).get(routes::batteries::list_batteries),
        )
        .route("/api/batteries/:id", get(routes::batteries::get_battery))
        .route(
            "/api/batteries/:id/readings",
            post(routes::batteries::append_reading),
        )
        .route("/api/battery/:id/soh/explain", get(routes::predictions::explain))
        .route(
            "/api/battery/:id/predictions/latest",
            get(routes::predictions::latest),
        )
        .route("/api/battery/:id/summary", get(routes::predictions::summary))
        .route("/api/predictions/:id", get(routes::predictions::exists))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let prediction_count = state.pipeline.prediction_count().await.ok();
    let status = if prediction_count.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        battery_count: state.pipeline.batteries().count(),
        prediction_count,
    })
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Initialize logging
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level: Level = level.parse()?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Build the pipeline from configuration and serve until shutdown
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let ledger = open_ledger(&config.pipeline.ledger).await?;
    let pipeline = Pipeline::new(&config.pipeline, Arc::new(BatteryRepository::new()), ledger)?;
    let metrics = PrometheusBuilder::new().install_recorder()?;

    let state = Arc::new(AppState::new(pipeline, Some(metrics)));
    let app = create_router(state);

    info!("Starting API server on {}", config.server.bind_address);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
