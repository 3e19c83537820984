//! Type definitions for the scoring engine

pub mod audience;
pub mod campaign;
pub mod creator;
pub mod embedding;
pub mod feedback;
pub mod fraud;
pub mod model_version;
pub mod prediction;
pub mod quality;
pub mod weights;

pub use audience::AudienceProfile;
pub use campaign::Campaign;
pub use creator::{Creator, FollowerTier, MetricSnapshot};
pub use embedding::{Embedding, EntityType};
pub use feedback::{CampaignOutcome, FeedbackFilter, FeedbackRecord};
pub use fraud::{FraudAnalysis, FraudSignal, Recommendation, Severity, SignalType};
pub use model_version::ModelVersion;
pub use prediction::{CampaignPrediction, Prediction};
pub use quality::{QualityIndex, QualitySnapshot, QualityTrend, SubScores};
pub use weights::{ScoringWeightConfig, WeightMap, WeightOptimizationRun};
