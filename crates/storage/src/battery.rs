//! Battery Telemetry Store

use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts at a short `BATT-NNNN` code before widening to a uuid-derived one
const SHORT_ID_ATTEMPTS: usize = 32;

/// Lifecycle status of a battery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryStatus {
    #[default]
    InUse,
    SecondLife,
    EndOfLife,
}

/// One sensor sample. Absent fields are unknown, not zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Terminal voltage (V)
    #[serde(default)]
    pub voltage: Option<f64>,
    /// Current (A)
    #[serde(default)]
    pub current: Option<f64>,
    /// Cell temperature (°C)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Charge cycle count
    pub cycles: u32,
    /// Ambient temperature (°C)
    #[serde(default)]
    pub ambient_temperature: Option<f64>,
    /// Electrolyte resistance
    #[serde(default, rename = "Re")]
    pub re: Option<f64>,
    /// Charge transfer resistance
    #[serde(default, rename = "Rct")]
    pub rct: Option<f64>,
    /// Capture time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Reading with only the required cycle counter set
    pub fn new(cycles: u32) -> Self {
        Self {
            voltage: None,
            current: None,
            temperature: None,
            cycles,
            ambient_temperature: None,
            re: None,
            rct: None,
            timestamp: Utc::now(),
        }
    }
}

/// Attributes supplied when registering a battery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBattery {
    /// Caller-chosen identifier; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub battery_type: String,
    #[serde(rename = "capacity_kWh")]
    pub capacity_kwh: f64,
    /// Declared health percentage (0-100)
    #[serde(default)]
    pub health: Option<f64>,
    #[serde(default)]
    pub status: BatteryStatus,
    #[serde(default)]
    pub chemistry: Option<String>,
    #[serde(default)]
    pub nominal_voltage: Option<f64>,
    /// Internal resistance (ohms)
    #[serde(default)]
    pub internal_resistance: Option<f64>,
    /// Rated lifecycle in full cycles
    #[serde(default)]
    pub rated_lifecycle: Option<u32>,
    /// Calendar age (years)
    #[serde(default)]
    pub calendar_age: Option<f64>,
    /// Cycle counter at registration
    #[serde(default)]
    pub cycles: Option<u32>,
}

/// Registered battery with its sensor log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub battery_type: String,
    #[serde(rename = "capacity_kWh")]
    pub capacity_kwh: f64,
    pub health: Option<f64>,
    pub status: BatteryStatus,
    pub chemistry: Option<String>,
    pub nominal_voltage: Option<f64>,
    pub internal_resistance: Option<f64>,
    pub rated_lifecycle: Option<u32>,
    pub calendar_age: Option<f64>,
    /// Cycle counter at registration
    pub cycles: u32,
    pub created_at: DateTime<Utc>,
    /// Append-only, insertion order is chronological order
    #[serde(rename = "sensorData")]
    pub readings: Vec<SensorReading>,
}

impl BatteryRecord {
    /// Most recently appended reading
    pub fn latest_reading(&self) -> Option<&SensorReading> {
        self.readings.last()
    }
}

impl NewBattery {
    fn validate(&self) -> Result<(), StorageError> {
        if self.battery_type.trim().is_empty() {
            return Err(StorageError::InvalidRecord("type must not be empty".to_string()));
        }
        if !self.capacity_kwh.is_finite() || self.capacity_kwh < 0.0 {
            return Err(StorageError::InvalidRecord(format!(
                "capacity_kWh {} is not a non-negative number",
                self.capacity_kwh
            )));
        }
        if let Some(health) = self.health {
            if !(0.0..=100.0).contains(&health) {
                return Err(StorageError::InvalidRecord(format!(
                    "health {} is out of range [0, 100]",
                    health
                )));
            }
        }
        for (field, value) in [
            ("internal_resistance", self.internal_resistance),
            ("calendar_age", self.calendar_age),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(StorageError::InvalidRecord(format!(
                    "{} must be a non-negative number",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// In-memory battery repository
pub struct BatteryRepository {
    batteries: RwLock<HashMap<String, BatteryRecord>>,
}

impl BatteryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        info!("Creating in-memory battery repository");
        Self {
            batteries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a battery, assigning an identifier when none is given
    pub fn create(&self, new: NewBattery) -> Result<BatteryRecord, StorageError> {
        new.validate()?;

        let mut batteries = self.batteries.write().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        let id = match explicit_id(&new) {
            Some(id) if batteries.contains_key(id) => {
                return Err(StorageError::Duplicate(id.to_string()));
            }
            Some(id) => id.to_string(),
            None => generate_id(|candidate| batteries.contains_key(candidate)),
        };

        let record = BatteryRecord {
            id: id.clone(),
            battery_type: new.battery_type,
            capacity_kwh: new.capacity_kwh,
            health: new.health,
            status: new.status,
            chemistry: new.chemistry,
            nominal_voltage: new.nominal_voltage,
            internal_resistance: new.internal_resistance,
            rated_lifecycle: new.rated_lifecycle,
            calendar_age: new.calendar_age,
            cycles: new.cycles.unwrap_or(0),
            created_at: Utc::now(),
            readings: Vec::new(),
        };

        batteries.insert(id.clone(), record.clone());
        info!("Registered battery {}", id);
        Ok(record)
    }

    /// Get a battery by identifier
    pub fn get(&self, id: &str) -> Result<BatteryRecord, StorageError> {
        let batteries = self.batteries.read().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        batteries
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// List all batteries, oldest registration first
    pub fn list(&self) -> Result<Vec<BatteryRecord>, StorageError> {
        let batteries = self.batteries.read().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        let mut all: Vec<_> = batteries.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    /// Append a reading to a battery's sensor log, returning the new log length
    pub fn append_reading(&self, id: &str, reading: SensorReading) -> Result<usize, StorageError> {
        let mut batteries = self.batteries.write().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        let battery = batteries
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        if let Some(last) = battery.readings.last() {
            if reading.timestamp < last.timestamp {
                warn!(
                    "Reading for {} is older than the previous one ({} < {})",
                    id, reading.timestamp, last.timestamp
                );
            }
        }

        battery.readings.push(reading);
        debug!("Appended reading #{} for {}", battery.readings.len(), id);
        Ok(battery.readings.len())
    }

    /// Identifier `new` would be registered under. Explicit ids are trimmed;
    /// otherwise a free one is generated. Nothing is reserved.
    pub fn assign_id(&self, new: &NewBattery) -> Result<String, StorageError> {
        if let Some(id) = explicit_id(new) {
            return Ok(id.to_string());
        }

        let batteries = self.batteries.read().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;
        Ok(generate_id(|candidate| batteries.contains_key(candidate)))
    }

    /// Unregister a battery, returning its record
    pub fn remove(&self, id: &str) -> Result<BatteryRecord, StorageError> {
        let mut batteries = self.batteries.write().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        let removed = batteries
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        info!("Removed battery {}", id);
        Ok(removed)
    }

    /// Get total battery count
    pub fn count(&self) -> usize {
        self.batteries.read().map(|b| b.len()).unwrap_or(0)
    }
}

impl Default for BatteryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn explicit_id(new: &NewBattery) -> Option<&str> {
    new.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
}

/// Short `BATT-NNNN` code, widened when the short space keeps colliding
fn generate_id(taken: impl Fn(&str) -> bool) -> String {
    for _ in 0..SHORT_ID_ATTEMPTS {
        let n = 1000 + (Uuid::new_v4().as_u128() % 9000) as u32;
        let candidate = format!("BATT-{}", n);
        if !taken(&candidate) {
            return candidate;
        }
    }

    loop {
        let simple = Uuid::new_v4().simple().to_string().to_uppercase();
        let candidate = format!("BATT-{}", &simple[..8]);
        if !taken(&candidate) {
            warn!("Short id space congested, assigned {}", candidate);
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_battery() -> NewBattery {
        NewBattery {
            battery_type: "Li-ion".to_string(),
            capacity_kwh: 75.0,
            health: Some(95.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_assigns_short_id() {
        let repo = BatteryRepository::new();
        let battery = repo.create(new_battery()).unwrap();

        assert!(battery.id.starts_with("BATT-"));
        assert_eq!(battery.id.len(), "BATT-1234".len());
        assert_eq!(battery.status, BatteryStatus::InUse);
        assert!(battery.readings.is_empty());
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let repo = BatteryRepository::new();
        let new = NewBattery {
            id: Some("BATT-0001".to_string()),
            ..new_battery()
        };
        repo.create(new.clone()).unwrap();

        assert!(matches!(repo.create(new), Err(StorageError::Duplicate(_))));
    }

    #[test]
    fn test_assigned_id_is_used_by_create() {
        let repo = BatteryRepository::new();
        let mut new = new_battery();

        let id = repo.assign_id(&new).unwrap();
        assert!(id.starts_with("BATT-"));
        assert_eq!(repo.count(), 0);

        new.id = Some(id.clone());
        assert_eq!(repo.create(new).unwrap().id, id);

        let explicit = NewBattery {
            id: Some("  BATT-0042 ".to_string()),
            ..new_battery()
        };
        assert_eq!(repo.assign_id(&explicit).unwrap(), "BATT-0042");
    }

    #[test]
    fn test_remove_unregisters() {
        let repo = BatteryRepository::new();
        let battery = repo.create(new_battery()).unwrap();

        assert_eq!(repo.remove(&battery.id).unwrap().id, battery.id);
        assert!(matches!(repo.get(&battery.id), Err(StorageError::NotFound(_))));
        assert!(matches!(repo.remove(&battery.id), Err(StorageError::NotFound(_))));
        assert_eq!(repo.count(), 0);
    }

    #[test]
    fn test_generate_id_widens_when_congested() {
        let id = generate_id(|candidate| candidate.len() == "BATT-1234".len());
        assert_eq!(id.len(), "BATT-".len() + 8);
    }

    #[test]
    fn test_invalid_health_rejected() {
        let repo = BatteryRepository::new();
        let new = NewBattery {
            health: Some(140.0),
            ..new_battery()
        };
        assert!(matches!(repo.create(new), Err(StorageError::InvalidRecord(_))));
    }

    #[test]
    fn test_append_and_latest_reading() {
        let repo = BatteryRepository::new();
        let battery = repo.create(new_battery()).unwrap();

        repo.append_reading(&battery.id, SensorReading::new(10)).unwrap();
        let len = repo.append_reading(&battery.id, SensorReading::new(11)).unwrap();
        assert_eq!(len, 2);

        let stored = repo.get(&battery.id).unwrap();
        assert_eq!(stored.latest_reading().map(|r| r.cycles), Some(11));
    }

    #[test]
    fn test_append_to_unknown_battery() {
        let repo = BatteryRepository::new();
        let result = repo.append_reading("BATT-9999", SensorReading::new(1));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_reading_wire_names() {
        let reading: SensorReading =
            serde_json::from_str(r#"{"cycles": 3, "Re": 0.05, "Rct": 0.08}"#).unwrap();
        assert_eq!(reading.re, Some(0.05));
        assert_eq!(reading.rct, Some(0.08));
        assert_eq!(reading.voltage, None);

        assert!(serde_json::from_str::<SensorReading>(r#"{"voltage": 3.7}"#).is_err());
        assert!(serde_json::from_str::<SensorReading>(r#"{"cycles": -1}"#).is_err());
    }
}
