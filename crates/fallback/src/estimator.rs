//! Linear Cycle and Calendar Fade Model

use recommendation::Auxiliary;
use serde::{Deserialize, Serialize};
use storage::BatteryRecord;
use tracing::debug;

/// Rated lifecycle assumed when a battery declares none
pub const DEFAULT_RATED_LIFECYCLE: u32 = 1000;

/// Health fraction lost per calendar year
pub const CALENDAR_FADE_PER_YEAR: f64 = 0.01;

/// Inputs to the analytic estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackInputs {
    /// Declared health percentage; 100 when absent
    pub health: Option<f64>,
    pub cycles: u32,
    pub rated_lifecycle: Option<u32>,
    /// Years
    pub calendar_age: Option<f64>,
    /// Ohms; not part of the estimate, forwarded to the recommendation
    pub internal_resistance: Option<f64>,
}

impl FallbackInputs {
    /// Auxiliary signals for the recommendation engine
    pub fn auxiliary(&self) -> Auxiliary {
        Auxiliary {
            internal_resistance: self.internal_resistance,
            calendar_age: self.calendar_age,
        }
    }
}

impl From<&BatteryRecord> for FallbackInputs {
    fn from(battery: &BatteryRecord) -> Self {
        Self {
            health: battery.health,
            cycles: battery.cycles,
            rated_lifecycle: battery.rated_lifecycle,
            calendar_age: battery.calendar_age,
            internal_resistance: battery.internal_resistance,
        }
    }
}

/// Result of the analytic estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackEstimate {
    /// State of health in [0, 100]
    pub soh: f64,
    /// Fraction lost to cycling
    pub cycle_fade: f64,
    /// Fraction lost to calendar ageing
    pub calendar_fade: f64,
}

/// Estimate state of health. Pure and infallible.
pub fn estimate(inputs: &FallbackInputs) -> FallbackEstimate {
    let soh0 = inputs.health.map_or(1.0, |h| h / 100.0);
    let rated = inputs.rated_lifecycle.unwrap_or(DEFAULT_RATED_LIFECYCLE);

    // Zero rated lifecycle means the battery has no cycles left to give
    let cycle_fade = if rated == 0 {
        soh0
    } else {
        soh0 * (f64::from(inputs.cycles) / f64::from(rated))
    };
    let calendar_fade = CALENDAR_FADE_PER_YEAR * inputs.calendar_age.unwrap_or(0.0);

    let raw = (soh0 - cycle_fade - calendar_fade) * 100.0;
    let soh = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };

    debug!(
        "Fallback estimate: soh0={:.3} cycle_fade={:.3} calendar_fade={:.3} soh={:.2}",
        soh0, cycle_fade, calendar_fade, soh
    );

    FallbackEstimate {
        soh,
        cycle_fade,
        calendar_fade,
    }
}
