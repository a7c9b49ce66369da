//! Feature Profiles and Payload Schema

use crate::FeatureError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current version of the estimator payload layout
pub const SCHEMA_VERSION: u32 = 1;

const BASIC_FEATURES: [&str; 3] = ["voltage", "temperature", "cycles"];
const EXTENDED_FEATURES: [&str; 3] = ["ambient_temperature", "Re", "Rct"];

/// Named set of inputs an estimator was trained on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureProfile {
    /// Voltage, temperature and cycle count
    Basic,
    /// Ambient temperature and the two resistance-model parameters
    #[default]
    Extended,
}

impl FeatureProfile {
    /// Feature names in payload order
    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            FeatureProfile::Basic => &BASIC_FEATURES,
            FeatureProfile::Extended => &EXTENDED_FEATURES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureProfile::Basic => "basic",
            FeatureProfile::Extended => "extended",
        }
    }
}

/// Profile plus layout version, compared at pipeline construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub profile: FeatureProfile,
    pub version: u32,
}

impl FeatureSchema {
    /// Schema for a profile at the current layout version
    pub fn current(profile: FeatureProfile) -> Self {
        Self {
            profile,
            version: SCHEMA_VERSION,
        }
    }

    /// Fail unless `estimator` accepts what this schema produces
    pub fn ensure_compatible(&self, estimator: &FeatureSchema) -> Result<(), FeatureError> {
        if self == estimator {
            Ok(())
        } else {
            Err(FeatureError::SchemaMismatch {
                extractor: *self,
                estimator: *estimator,
            })
        }
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.profile.as_str(), self.version)
    }
}
