//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline::PipelineError;
use serde_json::json;
use storage::StorageError;
use thiserror::Error;
use tracing::{error, warn};

/// Handler errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{0}")]
    NotFound(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Pipeline(PipelineError::Store(err))
    }
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Pipeline(e) => e.kind(),
            ApiError::NotFound(_) => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(e) => match e.kind() {
                "no_telemetry" | "battery_not_found" => StatusCode::NOT_FOUND,
                "invalid_battery" => StatusCode::BAD_REQUEST,
                "duplicate_battery" => StatusCode::CONFLICT,
                _ if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Pipeline(e) if e.is_retryable())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", self.kind(), self);
        } else {
            warn!("Request rejected ({}): {}", self.kind(), self);
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "kind": self.kind(),
                "retryable": self.is_retryable(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(PipelineError::NoTelemetry("BATT-1".into())), StatusCode::NOT_FOUND),
            (ApiError::from(StorageError::NotFound("BATT-1".into())), StatusCode::NOT_FOUND),
            (ApiError::from(StorageError::InvalidRecord("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(StorageError::Duplicate("BATT-1".into())), StatusCode::CONFLICT),
            (
                ApiError::from(PipelineError::LedgerWrite(StorageError::DatabaseError("x".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::NotFound("none".into()), StatusCode::NOT_FOUND),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err.kind());
        }
    }
}
