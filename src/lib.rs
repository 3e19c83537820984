//! Creator Scoring Engine Library
//!
//! Scores marketplace creators against brand campaigns and learns from
//! campaign outcomes: semantic similarity, a creator quality index, fraud
//! signals, performance prediction, tunable match weights and a retraining
//! pipeline, tied together by [`ScoringEngine`].

pub mod audience;
pub mod batch;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod feature_extractor;
pub mod feedback;
pub mod fraud;
pub mod metrics;
pub mod models;
pub mod optimizer;
pub mod quality;
pub mod retraining;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::{MatchScore, ScoringEngine};
pub use error::{EngineError, EngineResult};
pub use feature_extractor::FeatureExtractor;
pub use optimizer::{MatchWeights, DEFAULT_WEIGHTS};
pub use store::{MemoryStore, Store};
pub use types::{Campaign, CampaignOutcome, Creator, FeedbackRecord};
