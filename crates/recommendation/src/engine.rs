//! Recommendation Engine Implementation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Recommendation category, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Recycle within 30 days
    Critical,
    /// Replace within the next month
    Aging,
    /// Monitor regularly
    Degraded,
    /// Healthy capacity but high internal resistance
    ResistanceWarning,
    /// Healthy capacity but old cells
    AgeWarning,
    /// No action required
    Healthy,
}

impl Category {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Critical => "critical",
            Category::Aging => "aging",
            Category::Degraded => "degraded",
            Category::ResistanceWarning => "resistance_warning",
            Category::AgeWarning => "age_warning",
            Category::Healthy => "healthy",
        }
    }

    /// Human-readable advice attached to predictions
    pub fn advice(&self) -> &'static str {
        match self {
            Category::Critical => {
                "Critical: Recycle battery within 30 days. Performance will degrade rapidly."
            }
            Category::Aging => "Battery aging. Consider replacing within the next month.",
            Category::Degraded => "Battery slightly degraded. Monitor regularly.",
            Category::ResistanceWarning => "Internal resistance high. Performance may drop.",
            Category::AgeWarning => "Battery is old. Observe performance closely.",
            Category::Healthy => "Battery is healthy. No immediate action required.",
        }
    }

    /// Whether the category asks for replacement or recycling
    pub fn requires_action(&self) -> bool {
        matches!(self, Category::Critical | Category::Aging)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Category::Critical),
            "aging" => Ok(Category::Aging),
            "degraded" => Ok(Category::Degraded),
            "resistance_warning" => Ok(Category::ResistanceWarning),
            "age_warning" => Ok(Category::AgeWarning),
            "healthy" => Ok(Category::Healthy),
            other => Err(format!("unknown recommendation category: {}", other)),
        }
    }
}

/// Auxiliary signals consulted once capacity is in the healthy band
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Auxiliary {
    /// Internal resistance (ohms)
    pub internal_resistance: Option<f64>,
    /// Calendar age (years)
    pub calendar_age: Option<f64>,
}

/// Band thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// SoH strictly below this is critical (default: 50)
    pub critical_below: f64,
    /// SoH up to and including this is aging (default: 60)
    pub aging_up_to: f64,
    /// SoH strictly below this is degraded (default: 75)
    pub degraded_below: f64,
    /// Resistance strictly above this raises a warning (default: 0.5 ohm)
    pub resistance_limit: f64,
    /// Calendar age strictly above this raises a warning (default: 3 years)
    pub calendar_age_limit: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            critical_below: 50.0,
            aging_up_to: 60.0,
            degraded_below: 75.0,
            resistance_limit: 0.5,
            calendar_age_limit: 3.0,
        }
    }
}

/// Deterministic SoH classifier
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    config: RecommendationConfig,
}

impl RecommendationEngine {
    /// Create an engine with custom thresholds
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    /// Classify an SoH value. First matching band wins.
    ///
    /// `soh` must be finite; callers reject NaN and infinities beforehand.
    pub fn recommend(&self, soh: f64, aux: &Auxiliary) -> Category {
        debug_assert!(soh.is_finite(), "soh must be finite");
        let c = &self.config;

        let category = if soh < c.critical_below {
            Category::Critical
        } else if soh <= c.aging_up_to {
            Category::Aging
        } else if soh < c.degraded_below {
            Category::Degraded
        } else if aux.internal_resistance.is_some_and(|r| r > c.resistance_limit) {
            Category::ResistanceWarning
        } else if aux.calendar_age.is_some_and(|age| age > c.calendar_age_limit) {
            Category::AgeWarning
        } else {
            Category::Healthy
        };

        debug!("Classified soh={:.2} as {}", soh, category);
        category
    }

    /// Get thresholds
    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }
}

/// Classify with the default thresholds
pub fn recommend(soh: f64, aux: &Auxiliary) -> Category {
    RecommendationEngine::default().recommend(soh, aux)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NONE: Auxiliary = Auxiliary {
        internal_resistance: None,
        calendar_age: None,
    };

    #[test]
    fn test_band_boundaries() {
        assert_eq!(recommend(0.0, &NONE), Category::Critical);
        assert_eq!(recommend(49.999, &NONE), Category::Critical);
        assert_eq!(recommend(50.0, &NONE), Category::Aging);
        assert_eq!(recommend(60.0, &NONE), Category::Aging);
        assert_eq!(recommend(60.001, &NONE), Category::Degraded);
        assert_eq!(recommend(74.999, &NONE), Category::Degraded);
        assert_eq!(recommend(75.0, &NONE), Category::Healthy);
        assert_eq!(recommend(100.0, &NONE), Category::Healthy);
    }

    #[test]
    fn test_resistance_warning() {
        let aux = Auxiliary {
            internal_resistance: Some(0.6),
            calendar_age: None,
        };
        assert_eq!(recommend(75.0, &aux), Category::ResistanceWarning);

        // Exactly at the limit is not a warning
        let aux = Auxiliary {
            internal_resistance: Some(0.5),
            calendar_age: None,
        };
        assert_eq!(recommend(90.0, &aux), Category::Healthy);
    }

    #[test]
    fn test_resistance_takes_precedence_over_age() {
        let aux = Auxiliary {
            internal_resistance: Some(0.8),
            calendar_age: Some(5.0),
        };
        assert_eq!(recommend(80.0, &aux), Category::ResistanceWarning);

        let aux = Auxiliary {
            internal_resistance: Some(0.1),
            calendar_age: Some(5.0),
        };
        assert_eq!(recommend(80.0, &aux), Category::AgeWarning);
    }

    #[test]
    fn test_severity_bands_ignore_auxiliary() {
        let aux = Auxiliary {
            internal_resistance: Some(2.0),
            calendar_age: Some(10.0),
        };
        assert_eq!(recommend(40.0, &aux), Category::Critical);
        assert_eq!(recommend(55.0, &aux), Category::Aging);
        assert_eq!(recommend(70.0, &aux), Category::Degraded);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Category::ResistanceWarning).unwrap();
        assert_eq!(json, "\"resistance_warning\"");
        assert_eq!("age_warning".parse::<Category>(), Ok(Category::AgeWarning));
        assert!("unknown".parse::<Category>().is_err());
        assert!(Category::Critical.requires_action());
        assert!(!Category::Degraded.requires_action());
    }

    proptest! {
        #[test]
        fn prop_below_fifty_is_critical(soh in 0.0f64..50.0) {
            prop_assert_eq!(recommend(soh, &NONE), Category::Critical);
        }

        #[test]
        fn prop_healthy_band_never_severe(
            soh in 75.0f64..=100.0,
            r in proptest::option::of(0.0f64..5.0),
            age in proptest::option::of(0.0f64..20.0),
        ) {
            let aux = Auxiliary { internal_resistance: r, calendar_age: age };
            let category = recommend(soh, &aux);
            prop_assert!(!category.requires_action());
            prop_assert_ne!(category, Category::Degraded);
        }
    }
}
