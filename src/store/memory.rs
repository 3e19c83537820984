//! In-memory store

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::info;

use super::Store;
use crate::types::{
    AudienceProfile, Campaign, CampaignPrediction, Creator, Embedding, EntityType, FeedbackFilter,
    FeedbackRecord, FraudSignal, ModelVersion, QualityIndex, QualitySnapshot, ScoringWeightConfig,
    WeightOptimizationRun,
};

type PairKey = (String, String);

/// Seed file contents for bootstrapping a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub feedback: Vec<FeedbackRecord>,
}

impl SeedData {
    /// Load seed data from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse seed file {}", path.display()))
    }
}

#[derive(Default)]
struct Inner {
    creators: BTreeMap<String, Creator>,
    campaigns: BTreeMap<String, Campaign>,
    embeddings: HashMap<(EntityType, String), Embedding>,
    quality: HashMap<String, QualityIndex>,
    quality_history: HashMap<String, Vec<QualitySnapshot>>,
    fraud_signals: Vec<FraudSignal>,
    predictions: HashMap<PairKey, CampaignPrediction>,
    feedback: HashMap<PairKey, FeedbackRecord>,
    weight_configs: HashMap<String, ScoringWeightConfig>,
    optimization_runs: HashMap<String, WeightOptimizationRun>,
    model_versions: Vec<ModelVersion>,
    audience: HashMap<String, AudienceProfile>,
}

/// Process-local [`Store`] backed by hash maps
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    /// Write operations that fail until cleared
    /// Remaining injected failures per operation
    failing: Mutex<HashMap<&'static str, usize>>,
}

fn pair(campaign_id: &str, creator_id: &str) -> PairKey {
    (campaign_id.to_string(), creator_id.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with seed data
    pub async fn from_seed(seed: SeedData) -> Self {
        let store = Self::new();
        let (creators, campaigns, feedback) = (seed.creators.len(), seed.campaigns.len(), seed.feedback.len());
        {
            let mut inner = store.inner.write().await;
            for creator in seed.creators {
                inner.creators.insert(creator.id.clone(), creator);
            }
            for campaign in seed.campaigns {
                inner.campaigns.insert(campaign.id.clone(), campaign);
            }
            for record in seed.feedback {
                inner
                    .feedback
                    .insert(pair(&record.campaign_id, &record.creator_id), record);
            }
        }
        info!(creators, campaigns, feedback, "Memory store seeded");
        store
    }

    pub async fn insert_creator(&self, creator: Creator) {
        self.inner.write().await.creators.insert(creator.id.clone(), creator);
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.inner.write().await.campaigns.insert(campaign.id.clone(), campaign);
    }

    /// All signals for a creator, resolved or not
    pub async fn all_fraud_signals(&self, creator_id: &str) -> Vec<FraudSignal> {
        self.inner
            .read()
            .await
            .fraud_signals
            .iter()
            .filter(|s| s.creator_id == creator_id)
            .cloned()
            .collect()
    }

    /// Make a model-version write (`insert_model_version`, `demote_production`,
    /// `promote_model_version`) fail with an error until [`Self::clear_failures`]
    pub fn fail_operation(&self, operation: &'static str) {
        self.fail_operation_times(operation, usize::MAX);
    }

    /// Fail the next `times` calls of `operation`, then succeed again
    pub fn fail_operation_times(&self, operation: &'static str, times: usize) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(operation, times);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    fn check_failure(&self, operation: &'static str) -> Result<()> {
        let Ok(mut failing) = self.failing.lock() else {
            return Ok(());
        };
        match failing.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                bail!("{} failed: store unavailable", operation);
            }
            _ => Ok(()),
        }
    }

    pub async fn optimization_run_count(&self) -> usize {
        self.inner.read().await.optimization_runs.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_creator(&self, id: &str) -> Result<Option<Creator>> {
        Ok(self.inner.read().await.creators.get(id).cloned())
    }

    async fn list_creators(&self, offset: usize, limit: usize) -> Result<Vec<Creator>> {
        Ok(self
            .inner
            .read()
            .await
            .creators
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_creator_ai_score(&self, id: &str, score: f64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let creator = inner
            .creators
            .get_mut(id)
            .with_context(|| format!("Creator {} vanished while writing ai score", id))?;
        creator.ai_score = Some(score);
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.inner.read().await.campaigns.get(id).cloned())
    }

    async fn list_campaigns(&self, offset: usize, limit: usize) -> Result<Vec<Campaign>> {
        Ok(self
            .inner
            .read()
            .await
            .campaigns
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_embedding(&self, entity_type: EntityType, entity_id: &str) -> Result<Option<Embedding>> {
        Ok(self
            .inner
            .read()
            .await
            .embeddings
            .get(&(entity_type, entity_id.to_string()))
            .cloned())
    }

    async fn upsert_embedding(&self, embedding: Embedding) -> Result<()> {
        let key = (embedding.entity_type, embedding.entity_id.clone());
        self.inner.write().await.embeddings.insert(key, embedding);
        Ok(())
    }

    async fn list_embeddings(&self, entity_type: EntityType) -> Result<Vec<Embedding>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Embedding> = inner
            .embeddings
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(rows)
    }

    async fn get_quality_index(&self, creator_id: &str) -> Result<Option<QualityIndex>> {
        Ok(self.inner.read().await.quality.get(creator_id).cloned())
    }

    async fn upsert_quality_index(&self, index: QualityIndex) -> Result<()> {
        self.inner
            .write()
            .await
            .quality
            .insert(index.creator_id.clone(), index);
        Ok(())
    }

    async fn append_quality_snapshot(&self, snapshot: QualitySnapshot) -> Result<()> {
        self.inner
            .write()
            .await
            .quality_history
            .entry(snapshot.creator_id.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn quality_history(&self, creator_id: &str, limit: usize) -> Result<Vec<QualitySnapshot>> {
        let inner = self.inner.read().await;
        let history = inner.quality_history.get(creator_id).cloned().unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        Ok(history.into_iter().skip(skip).collect())
    }

    async fn unresolved_fraud_signals(&self, creator_id: &str) -> Result<Vec<FraudSignal>> {
        Ok(self
            .inner
            .read()
            .await
            .fraud_signals
            .iter()
            .filter(|s| s.creator_id == creator_id && !s.resolved)
            .cloned()
            .collect())
    }

    async fn insert_fraud_signal(&self, signal: FraudSignal) -> Result<()> {
        self.inner.write().await.fraud_signals.push(signal);
        Ok(())
    }

    async fn resolve_fraud_signal(&self, signal_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.fraud_signals.iter_mut().find(|s| s.id == signal_id) {
            Some(signal) => {
                signal.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_prediction(&self, campaign_id: &str, creator_id: &str) -> Result<Option<CampaignPrediction>> {
        Ok(self
            .inner
            .read()
            .await
            .predictions
            .get(&pair(campaign_id, creator_id))
            .cloned())
    }

    async fn upsert_prediction(&self, prediction: CampaignPrediction) -> Result<()> {
        let key = pair(&prediction.campaign_id, &prediction.creator_id);
        self.inner.write().await.predictions.insert(key, prediction);
        Ok(())
    }

    async fn upsert_feedback(&self, record: FeedbackRecord) -> Result<()> {
        let key = pair(&record.campaign_id, &record.creator_id);
        self.inner.write().await.feedback.insert(key, record);
        Ok(())
    }

    async fn list_feedback(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<FeedbackRecord> = inner
            .feedback
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.campaign_id.cmp(&b.campaign_id))
                .then_with(|| a.creator_id.cmp(&b.creator_id))
        });
        Ok(records)
    }

    async fn get_weight_config(&self, name: &str) -> Result<Option<ScoringWeightConfig>> {
        Ok(self.inner.read().await.weight_configs.get(name).cloned())
    }

    async fn upsert_weight_config(&self, config: ScoringWeightConfig) -> Result<()> {
        self.inner
            .write()
            .await
            .weight_configs
            .insert(config.name.clone(), config);
        Ok(())
    }

    async fn insert_optimization_run(&self, run: WeightOptimizationRun) -> Result<()> {
        self.inner
            .write()
            .await
            .optimization_runs
            .insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_optimization_run(&self, id: &str) -> Result<Option<WeightOptimizationRun>> {
        Ok(self.inner.read().await.optimization_runs.get(id).cloned())
    }

    async fn update_optimization_run(&self, run: WeightOptimizationRun) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.optimization_runs.contains_key(&run.id) {
            anyhow::bail!("Optimization run {} does not exist", run.id);
        }
        inner.optimization_runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn production_model(&self, model_name: &str) -> Result<Option<ModelVersion>> {
        Ok(self
            .inner
            .read()
            .await
            .model_versions
            .iter()
            .find(|v| v.model_name == model_name && v.is_production)
            .cloned())
    }

    async fn latest_model_version(&self, model_name: &str) -> Result<Option<ModelVersion>> {
        Ok(self
            .inner
            .read()
            .await
            .model_versions
            .iter()
            .filter(|v| v.model_name == model_name)
            .max_by_key(|v| v.created_at)
            .cloned())
    }

    async fn list_model_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        Ok(self
            .inner
            .read()
            .await
            .model_versions
            .iter()
            .filter(|v| v.model_name == model_name)
            .cloned()
            .collect())
    }

    async fn get_model_version(&self, id: &str) -> Result<Option<ModelVersion>> {
        Ok(self
            .inner
            .read()
            .await
            .model_versions
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn insert_model_version(&self, version: ModelVersion) -> Result<()> {
        self.check_failure("insert_model_version")?;
        self.inner.write().await.model_versions.push(version);
        Ok(())
    }

    async fn demote_production(&self, model_name: &str) -> Result<usize> {
        self.check_failure("demote_production")?;
        let mut inner = self.inner.write().await;
        let mut changed = 0;
        for version in inner
            .model_versions
            .iter_mut()
            .filter(|v| v.model_name == model_name && v.is_production)
        {
            version.is_production = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn promote_model_version(&self, id: &str) -> Result<bool> {
        self.check_failure("promote_model_version")?;
        let mut inner = self.inner.write().await;
        match inner.model_versions.iter_mut().find(|v| v.id == id) {
            Some(version) => {
                version.is_production = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_audience_profile(&self, creator_id: &str) -> Result<Option<AudienceProfile>> {
        Ok(self.inner.read().await.audience.get(creator_id).cloned())
    }

    async fn upsert_audience_profile(&self, profile: AudienceProfile) -> Result<()> {
        self.inner
            .write()
            .await
            .audience
            .insert(profile.creator_id.clone(), profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creator_pagination_is_stable() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert_creator(Creator::new(format!("c{}", i), "tech", 1000, 2.0))
                .await;
        }

        let first = store.list_creators(0, 2).await.unwrap();
        let second = store.list_creators(2, 2).await.unwrap();
        let last = store.list_creators(4, 2).await.unwrap();

        assert_eq!(first.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c0", "c1"]);
        assert_eq!(second.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c2", "c3"]);
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_fraud_signal() {
        use crate::types::{Severity, SignalType};

        let store = MemoryStore::new();
        let signal = FraudSignal::new("c1", SignalType::BotActivity, Severity::Medium, 0.7, serde_json::Value::Null);
        let id = signal.id.clone();
        store.insert_fraud_signal(signal).await.unwrap();

        assert_eq!(store.unresolved_fraud_signals("c1").await.unwrap().len(), 1);
        assert!(store.resolve_fraud_signal(&id).await.unwrap());
        assert!(store.unresolved_fraud_signals("c1").await.unwrap().is_empty());
        assert!(!store.resolve_fraud_signal("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failures_until_cleared() {
        let store = MemoryStore::new();
        store.fail_operation("promote_model_version");
        assert!(store.promote_model_version("mv1").await.is_err());
        assert_eq!(store.demote_production("m").await.unwrap(), 0);

        store.clear_failures();
        assert!(!store.promote_model_version("mv1").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let store = MemoryStore::new();
        store.fail_operation_times("demote_production", 1);
        assert!(store.demote_production("m").await.is_err());
        assert_eq!(store.demote_production("m").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_quality_history_returns_latest_window() {
        let store = MemoryStore::new();
        for score in [10.0, 20.0, 30.0, 40.0] {
            store
                .append_quality_snapshot(QualitySnapshot {
                    creator_id: "c1".to_string(),
                    score,
                    fraud_risk_score: 0.0,
                    recorded_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }

        let history = store.quality_history("c1", 2).await.unwrap();
        assert_eq!(history.iter().map(|s| s.score).collect::<Vec<_>>(), vec![30.0, 40.0]);
    }
}
