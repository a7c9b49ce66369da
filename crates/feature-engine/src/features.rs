//! Feature Vector Assembly

use crate::profile::{FeatureProfile, FeatureSchema};
use crate::FeatureError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use storage::{BatteryRecord, SensorReading};
use tracing::debug;

/// Raw reading values kept for the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingSnapshot {
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub cycles: u32,
}

/// Fixed-shape estimator input derived from one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub schema: FeatureSchema,
    /// Values in `schema.profile.feature_names()` order; `None` is unknown
    pub values: Vec<Option<f64>>,
    pub snapshot: ReadingSnapshot,
    /// Capture time of the source reading
    pub captured_at: DateTime<Utc>,
}

impl FeatureVector {
    /// Value of a named feature
    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema
            .profile
            .feature_names()
            .iter()
            .position(|n| *n == name)
            .and_then(|idx| self.values.get(idx).copied().flatten())
    }

    /// Named (feature, value) pairs in payload order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, Option<f64>)> + '_ {
        self.schema
            .profile
            .feature_names()
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// JSON object handed to the external estimator; unknown values are null
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        let object: Map<String, Value> = self
            .named()
            .map(|(name, value)| (name.to_string(), value.map_or(Value::Null, Value::from)))
            .collect();
        serde_json::to_string(&object)
    }
}

/// Feature extractor for a single configured profile
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    schema: FeatureSchema,
}

impl FeatureExtractor {
    /// Create an extractor producing the current schema of `profile`
    pub fn new(profile: FeatureProfile) -> Self {
        Self {
            schema: FeatureSchema::current(profile),
        }
    }

    /// Schema of the vectors this extractor produces
    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// Extract features from the most recent reading of a battery
    pub fn extract(&self, battery: &BatteryRecord) -> Result<FeatureVector, FeatureError> {
        let reading = battery
            .latest_reading()
            .ok_or_else(|| FeatureError::NoTelemetry(battery.id.clone()))?;

        let values = match self.schema.profile {
            FeatureProfile::Basic => vec![
                known(reading.voltage),
                known(reading.temperature),
                Some(f64::from(reading.cycles)),
            ],
            FeatureProfile::Extended => vec![
                known(reading.ambient_temperature),
                known(reading.re),
                known(reading.rct),
            ],
        };

        debug!(
            "Extracted {} features for {} from reading #{}",
            self.schema,
            battery.id,
            battery.readings.len()
        );

        Ok(FeatureVector {
            schema: self.schema,
            values,
            snapshot: snapshot(reading),
            captured_at: reading.timestamp,
        })
    }
}

fn snapshot(reading: &SensorReading) -> ReadingSnapshot {
    ReadingSnapshot {
        voltage: reading.voltage,
        temperature: reading.temperature,
        cycles: reading.cycles,
    }
}

/// Non-finite sensor values are treated as unknown
fn known(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{BatteryRepository, NewBattery};

    fn battery_with(readings: Vec<SensorReading>) -> BatteryRecord {
        let repo = BatteryRepository::new();
        let battery = repo
            .create(NewBattery {
                battery_type: "Li-ion".to_string(),
                capacity_kwh: 60.0,
                ..Default::default()
            })
            .unwrap();
        for reading in readings {
            repo.append_reading(&battery.id, reading).unwrap();
        }
        repo.get(&battery.id).unwrap()
    }

    fn reading(cycles: u32) -> SensorReading {
        SensorReading {
            voltage: Some(3.7),
            temperature: Some(31.0),
            ambient_temperature: Some(24.0),
            re: Some(0.056),
            rct: Some(0.2),
            ..SensorReading::new(cycles)
        }
    }

    #[test]
    fn test_no_telemetry() {
        let extractor = FeatureExtractor::new(FeatureProfile::Basic);
        let battery = battery_with(vec![]);

        assert_eq!(
            extractor.extract(&battery),
            Err(FeatureError::NoTelemetry(battery.id.clone()))
        );
    }

    #[test]
    fn test_uses_most_recent_reading() {
        let extractor = FeatureExtractor::new(FeatureProfile::Basic);
        let battery = battery_with(vec![reading(10), reading(20), reading(30)]);

        let features = extractor.extract(&battery).unwrap();
        assert_eq!(features.get("cycles"), Some(30.0));
        assert_eq!(features.get("voltage"), Some(3.7));
        assert_eq!(features.snapshot.cycles, 30);
    }

    #[test]
    fn test_extended_profile() {
        let extractor = FeatureExtractor::new(FeatureProfile::Extended);
        let battery = battery_with(vec![reading(5)]);

        let features = extractor.extract(&battery).unwrap();
        assert_eq!(features.values, vec![Some(24.0), Some(0.056), Some(0.2)]);
        assert_eq!(features.get("voltage"), None);
        // Snapshot still records the raw reading
        assert_eq!(features.snapshot.temperature, Some(31.0));
    }

    #[test]
    fn test_short_vector_reads_as_unknown() {
        let extractor = FeatureExtractor::new(FeatureProfile::Basic);
        let mut features = extractor.extract(&battery_with(vec![reading(7)])).unwrap();
        features.values.truncate(1);

        assert_eq!(features.get("voltage"), Some(3.7));
        assert_eq!(features.get("cycles"), None);
    }

    #[test]
    fn test_unknown_values_serialize_as_null() {
        let extractor = FeatureExtractor::new(FeatureProfile::Basic);
        let mut sparse = SensorReading::new(12);
        sparse.temperature = Some(f64::NAN);
        let battery = battery_with(vec![sparse]);

        let features = extractor.extract(&battery).unwrap();
        let payload: Value = serde_json::from_str(&features.to_payload().unwrap()).unwrap();

        assert_eq!(payload["voltage"], Value::Null);
        assert_eq!(payload["temperature"], Value::Null);
        assert_eq!(payload["cycles"], 12.0);
    }
}
