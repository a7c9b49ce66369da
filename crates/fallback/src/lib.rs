//! Analytic Fallback Estimator
//!
//! Estimates state of health from lifecycle counters alone, without invoking
//! the external model.

mod estimator;

pub use estimator::{
    estimate, FallbackEstimate, FallbackInputs, CALENDAR_FADE_PER_YEAR, DEFAULT_RATED_LIFECYCLE,
};
