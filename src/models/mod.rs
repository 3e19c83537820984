//! Prediction model components

pub mod aggregator;
pub mod cache;
pub mod params;
pub mod prediction;

pub use aggregator::{AiWeights, ScoreAggregator, AI_WEIGHTS};
pub use cache::{CachedModel, ParameterCache};
pub use params::ModelParameters;
pub use prediction::PredictionModel;
