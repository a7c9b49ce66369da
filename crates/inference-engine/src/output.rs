//! Estimator Output Contract

use crate::bridge::ProcessOutput;
use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Validated estimator result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// State of health in [0, 100]
    pub soh: f64,
    /// Feature name to contribution weight
    pub attribution: Option<BTreeMap<String, f64>>,
    /// Wall-clock time of the process run
    pub latency_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    prediction: f64,
    #[serde(default, alias = "shap")]
    attribution: Option<BTreeMap<String, f64>>,
}

impl Inference {
    /// Apply the output contract: exit 0, silent stderr, JSON with a numeric
    /// `prediction`.
    pub fn from_output(output: ProcessOutput) -> Result<Self, InferenceError> {
        if !output.status.success() {
            return Err(InferenceError::ProcessExit {
                code: output.status.code(),
                stderr: lossy(&output.stderr),
            });
        }

        if !output.stderr.is_empty() {
            return Err(InferenceError::ProcessStderr(lossy(&output.stderr)));
        }

        let raw: RawOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| InferenceError::OutputParse(e.to_string()))?;

        if !raw.prediction.is_finite() {
            return Err(InferenceError::OutputParse(format!(
                "prediction {} is not finite",
                raw.prediction
            )));
        }

        let soh = raw.prediction.clamp(0.0, 100.0);
        if soh != raw.prediction {
            warn!("Estimator prediction {} clamped to {}", raw.prediction, soh);
        }

        Ok(Self {
            soh,
            attribution: raw.attribution,
            latency_ms: output.elapsed.as_millis() as u64,
        })
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}
