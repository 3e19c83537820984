//! Persistent record store contract.
//!
//! The engine reads and upserts the entities in [`crate::types`] through
//! this trait and never owns their schema. [`MemoryStore`] is the reference
//! implementation used by the scheduler binary and the tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    AudienceProfile, Campaign, CampaignPrediction, Creator, Embedding, EntityType, FeedbackFilter,
    FeedbackRecord, FraudSignal, ModelVersion, QualityIndex, QualitySnapshot, ScoringWeightConfig,
    WeightOptimizationRun,
};

pub use memory::{MemoryStore, SeedData};

#[async_trait]
pub trait Store: Send + Sync {
    // Creators and campaigns

    async fn get_creator(&self, id: &str) -> Result<Option<Creator>>;

    /// Page of creators in stable id order
    async fn list_creators(&self, offset: usize, limit: usize) -> Result<Vec<Creator>>;

    async fn set_creator_ai_score(&self, id: &str, score: f64) -> Result<()>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>>;

    async fn list_campaigns(&self, offset: usize, limit: usize) -> Result<Vec<Campaign>>;

    // Embeddings

    async fn get_embedding(&self, entity_type: EntityType, entity_id: &str) -> Result<Option<Embedding>>;

    async fn upsert_embedding(&self, embedding: Embedding) -> Result<()>;

    async fn list_embeddings(&self, entity_type: EntityType) -> Result<Vec<Embedding>>;

    // Quality index

    async fn get_quality_index(&self, creator_id: &str) -> Result<Option<QualityIndex>>;

    async fn upsert_quality_index(&self, index: QualityIndex) -> Result<()>;

    async fn append_quality_snapshot(&self, snapshot: QualitySnapshot) -> Result<()>;

    /// Up to `limit` most recent snapshots, oldest first
    async fn quality_history(&self, creator_id: &str, limit: usize) -> Result<Vec<QualitySnapshot>>;

    // Fraud signals

    async fn unresolved_fraud_signals(&self, creator_id: &str) -> Result<Vec<FraudSignal>>;

    async fn insert_fraud_signal(&self, signal: FraudSignal) -> Result<()>;

    /// Admin action; returns false when the signal does not exist
    async fn resolve_fraud_signal(&self, signal_id: &str) -> Result<bool>;

    // Predictions and feedback

    async fn get_prediction(&self, campaign_id: &str, creator_id: &str) -> Result<Option<CampaignPrediction>>;

    async fn upsert_prediction(&self, prediction: CampaignPrediction) -> Result<()>;

    async fn upsert_feedback(&self, record: FeedbackRecord) -> Result<()>;

    /// Matching records ordered by completion time
    async fn list_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackRecord>>;

    // Weight configs

    async fn get_weight_config(&self, name: &str) -> Result<Option<ScoringWeightConfig>>;

    async fn upsert_weight_config(&self, config: ScoringWeightConfig) -> Result<()>;

    async fn insert_optimization_run(&self, run: WeightOptimizationRun) -> Result<()>;

    async fn get_optimization_run(&self, id: &str) -> Result<Option<WeightOptimizationRun>>;

    async fn update_optimization_run(&self, run: WeightOptimizationRun) -> Result<()>;

    // Model versions

    async fn production_model(&self, model_name: &str) -> Result<Option<ModelVersion>>;

    /// Most recently created version regardless of production flag
    async fn latest_model_version(&self, model_name: &str) -> Result<Option<ModelVersion>>;

    /// Every version of a model, in insertion order
    async fn list_model_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>>;

    async fn get_model_version(&self, id: &str) -> Result<Option<ModelVersion>>;

    async fn insert_model_version(&self, version: ModelVersion) -> Result<()>;

    /// Clear the production flag on every version of a model; returns rows changed
    async fn demote_production(&self, model_name: &str) -> Result<usize>;

    /// Mark one version as production; returns false when it does not exist
    async fn promote_model_version(&self, id: &str) -> Result<bool>;

    // Audience profiles

    async fn get_audience_profile(&self, creator_id: &str) -> Result<Option<AudienceProfile>>;

    async fn upsert_audience_profile(&self, profile: AudienceProfile) -> Result<()>;
}
