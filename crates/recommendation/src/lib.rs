//! Recommendation Engine
//!
//! Maps a state-of-health estimate, plus optional auxiliary signals, onto a
//! fixed set of maintenance recommendations.

mod engine;

pub use engine::{recommend, Auxiliary, Category, RecommendationConfig, RecommendationEngine};
