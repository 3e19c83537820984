//! Campaign performance prediction

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::cosine_similarity;
use crate::error::{EngineError, EngineResult};
use crate::feature_extractor::{FeatureExtractor, PredictionFeatures};
use crate::models::cache::{self, CachedModel, ParameterCache};
use crate::models::params::ModelParameters;
use crate::store::Store;
use crate::types::prediction::{ConfidenceInterval, Interval};
use crate::types::{Campaign, CampaignPrediction, Creator, EntityType, Prediction};

pub const ENGAGEMENT_BOUNDS: (f64, f64) = (0.1, 20.0);
pub const ROI_BOUNDS: (f64, f64) = (-50.0, 500.0);

/// Engagement lift at perfect semantic similarity; absent similarity adds nothing
const SEMANTIC_LIFT: f64 = 0.15;
const MIN_LIFT: f64 = 0.2;

/// Heuristic forward model over extracted features
pub fn forward(creator: &Creator, campaign: &Campaign, features: &PredictionFeatures, model: &CachedModel) -> Prediction {
    let params: &ModelParameters = &model.params;
    let bench = params.benchmark(&campaign.category);
    let format = params.format_multiplier(&campaign.format);

    let observed = if creator.engagement_rate > 0.0 {
        creator.engagement_rate
    } else {
        bench.engagement
    };
    let blended = 0.6 * observed + 0.4 * bench.engagement;
    // Engagement signal is measured against the category benchmark on the same 0-1 scale
    let bench_signal = (bench.engagement / 10.0).clamp(0.0, 1.0);
    let lift = (1.0
        + params.weight("engagement_signal") * (features.engagement_signal - bench_signal)
        + params.weight("follower_tier") * (features.follower_tier - 0.5)
        + params.weight("category_match") * (features.category_match - 0.5)
        + params.weight("quality") * (features.quality - 0.5)
        + params.weight("success_ratio") * (features.success_ratio - 0.5)
        + SEMANTIC_LIFT * features.semantic_similarity)
        .max(MIN_LIFT);
    let engagement = (blended * format * lift).clamp(ENGAGEMENT_BOUNDS.0, ENGAGEMENT_BOUNDS.1);

    // Neutral at the heuristic price weight of 0.1
    let price_scale = 0.9 + params.weight("price_efficiency");
    let roi = (bench.roi
        * (0.5 + features.price_efficiency)
        * price_scale
        * (0.6 + 0.4 * features.success_ratio)
        * (0.7 + 0.3 * features.category_match)
        + (engagement - bench.engagement) * 5.0)
        .clamp(ROI_BOUNDS.0, ROI_BOUNDS.1);

    let reach = (creator.follower_count as f64
        * creator.tier().reach_rate()
        * format
        * (0.8 + 0.4 * features.quality))
        .round()
        .max(0.0) as u64;

    let track_record = (creator.total_campaigns as f64 / 10.0).min(1.0);
    let confidence = (0.3 + 0.3 * track_record + 0.2 * features.quality_confidence + 0.2 * features.category_match)
        .clamp(0.1, 0.95);

    let spread = 1.0 - confidence;
    let engagement_width = engagement * spread;
    let roi_width = roi.abs().max(10.0) * spread;

    let risk_score = (0.5 * features.fraud_risk + 0.3 * (1.0 - features.success_ratio) + 0.2 * (1.0 - confidence))
        .clamp(0.0, 1.0);

    Prediction {
        predicted_engagement: engagement,
        predicted_reach: reach,
        predicted_roi: roi,
        confidence_interval: ConfidenceInterval {
            engagement: Interval {
                low: (engagement - engagement_width).max(0.0),
                high: engagement + engagement_width,
            },
            roi: Interval {
                low: roi - roi_width,
                high: roi + roi_width,
            },
        },
        risk_score,
        confidence,
        model_version: model.version.clone(),
    }
}

/// Prediction service holding the production parameter cache
pub struct PredictionModel {
    store: Arc<dyn Store>,
    cache: Arc<ParameterCache>,
    extractor: FeatureExtractor,
    model_name: String,
}

impl PredictionModel {
    pub fn new(store: Arc<dyn Store>, cache: Arc<ParameterCache>, model_name: impl Into<String>) -> Self {
        Self {
            store,
            cache,
            extractor: FeatureExtractor::new(),
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Current production parameters, loading them on cache miss
    pub async fn current_parameters(&self) -> EngineResult<Arc<CachedModel>> {
        if let Some(model) = self.cache.get() {
            return Ok(model);
        }
        let loaded = cache::load_production(self.store.as_ref(), &self.model_name).await?;
        Ok(self.cache.set(loaded))
    }

    /// Drop cached parameters; the next prediction reloads from the store
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    async fn similarity(&self, creator_id: &str, campaign_id: &str) -> Option<f64> {
        let creator = self.store.get_embedding(EntityType::CreatorBio, creator_id).await;
        let campaign = self.store.get_embedding(EntityType::Campaign, campaign_id).await;
        match (creator, campaign) {
            (Ok(Some(a)), Ok(Some(b))) => Some(cosine_similarity(&a.vector, &b.vector)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(creator_id = %creator_id, error = %e, "Embedding lookup failed, similarity omitted");
                None
            }
            _ => None,
        }
    }

    /// Predict and persist performance for a creator on a campaign
    pub async fn predict(&self, creator_id: &str, campaign: &Campaign) -> EngineResult<Prediction> {
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", creator_id))?;

        let quality = match self.store.get_quality_index(creator_id).await {
            Ok(q) => q,
            Err(e) => {
                warn!(creator_id = %creator_id, error = %e, "Quality index lookup failed, using neutral quality");
                None
            }
        };
        let similarity = self.similarity(creator_id, &campaign.id).await;

        let features = self
            .extractor
            .extract(&creator, campaign, quality.as_ref(), similarity);
        let model = self.current_parameters().await?;
        let prediction = forward(&creator, campaign, &features, &model);

        self.store
            .upsert_prediction(CampaignPrediction {
                campaign_id: campaign.id.clone(),
                creator_id: creator_id.to_string(),
                prediction: prediction.clone(),
                features: features.to_map(),
                predicted_at: Utc::now(),
            })
            .await?;

        debug!(
            creator_id = %creator_id,
            campaign_id = %campaign.id,
            engagement = prediction.predicted_engagement,
            roi = prediction.predicted_roi,
            confidence = prediction.confidence,
            model_version = %prediction.model_version,
            "Prediction computed"
        );
        Ok(prediction)
    }

    /// Predict by campaign id
    pub async fn predict_for(&self, creator_id: &str, campaign_id: &str) -> EngineResult<Prediction> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Campaign", campaign_id))?;
        self.predict(creator_id, &campaign).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::HEURISTIC_VERSION;
    use crate::store::MemoryStore;
    use crate::types::model_version::ModelVersion;

    async fn setup() -> (Arc<MemoryStore>, PredictionModel) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_creator(Creator::new("c1", "tech", 40_000, 2.4).with_track_record(6, 8, 4.2, 85.0))
            .await;
        store
            .insert_campaign(Campaign::new("k1", "tech", 500.0).with_format("reel"))
            .await;
        let model = PredictionModel::new(store.clone(), Arc::new(ParameterCache::new()), "performance_predictor");
        (store, model)
    }

    #[tokio::test]
    async fn test_prediction_is_bounded_and_persisted() {
        let (store, model) = setup().await;
        let prediction = model.predict_for("c1", "k1").await.unwrap();

        assert!((0.1..=20.0).contains(&prediction.predicted_engagement));
        assert!((-50.0..=500.0).contains(&prediction.predicted_roi));
        assert!((0.0..=1.0).contains(&prediction.risk_score));
        assert!(prediction.confidence_interval.engagement.low <= prediction.predicted_engagement);
        assert!(prediction.confidence_interval.engagement.high >= prediction.predicted_engagement);
        assert_eq!(prediction.model_version, HEURISTIC_VERSION);

        let stored = store.get_prediction("k1", "c1").await.unwrap().unwrap();
        assert_eq!(stored.prediction.predicted_engagement, prediction.predicted_engagement);
        assert!(stored.features.contains_key("category_match"));
    }

    #[tokio::test]
    async fn test_interval_widens_with_lower_confidence() {
        let creator = Creator::new("c1", "tech", 40_000, 2.4);
        let campaign = Campaign::new("k1", "tech", 500.0);
        let model = CachedModel::heuristic();

        let sure = PredictionFeatures {
            category_match: 1.0,
            quality_confidence: 1.0,
            ..PredictionFeatures::default()
        };
        let unsure = PredictionFeatures {
            category_match: 0.1,
            quality_confidence: 0.0,
            ..PredictionFeatures::default()
        };

        let a = forward(&creator, &campaign, &sure, &model);
        let b = forward(&creator, &campaign, &unsure, &model);
        assert!(a.confidence > b.confidence);

        let relative = |p: &Prediction| {
            (p.confidence_interval.engagement.high - p.confidence_interval.engagement.low) / p.predicted_engagement
        };
        assert!(relative(&a) < relative(&b));
    }

    #[test]
    fn test_every_feature_moves_the_prediction() {
        let creator = Creator::new("c1", "tech", 40_000, 2.4);
        let campaign = Campaign::new("k1", "tech", 500.0);
        let model = CachedModel::heuristic();
        let base = PredictionFeatures {
            engagement_signal: 0.24,
            follower_tier: 0.5,
            category_match: 1.0,
            quality: 0.6,
            ..PredictionFeatures::default()
        };
        let baseline = forward(&creator, &campaign, &base, &model);

        let variants = [
            PredictionFeatures { semantic_similarity: 0.95, ..base },
            PredictionFeatures { follower_tier: 1.0, ..base },
            PredictionFeatures { engagement_signal: 1.0, ..base },
            PredictionFeatures { success_ratio: 0.9, ..base },
            PredictionFeatures { quality: 0.9, ..base },
            PredictionFeatures { category_match: 0.5, ..base },
        ];
        for features in &variants {
            let p = forward(&creator, &campaign, features, &model);
            assert_ne!(p.predicted_engagement, baseline.predicted_engagement, "{:?}", features);
        }

        let cheaper = forward(&creator, &campaign, &PredictionFeatures { price_efficiency: 0.9, ..base }, &model);
        assert!(cheaper.predicted_roi > baseline.predicted_roi);
    }

    #[test]
    fn test_learned_weights_reach_live_predictions() {
        let creator = Creator::new("c1", "tech", 40_000, 2.4);
        let campaign = Campaign::new("k1", "tech", 500.0);
        let features = PredictionFeatures {
            engagement_signal: 0.8,
            follower_tier: 0.9,
            price_efficiency: 0.7,
            category_match: 1.0,
            ..PredictionFeatures::default()
        };
        let baseline = forward(&creator, &campaign, &features, &CachedModel::heuristic());

        for name in ["engagement_signal", "follower_tier", "price_efficiency"] {
            let mut params = ModelParameters::default();
            params.set_weight(name, 0.5);
            let tuned = CachedModel {
                version: "v1.0".to_string(),
                params,
            };
            let p = forward(&creator, &campaign, &features, &tuned);
            assert!(
                p.predicted_engagement != baseline.predicted_engagement || p.predicted_roi != baseline.predicted_roi,
                "weight {} had no effect",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_cache_requires_explicit_invalidation() {
        let (store, model) = setup().await;
        assert_eq!(model.current_parameters().await.unwrap().version, HEURISTIC_VERSION);

        store
            .insert_model_version(ModelVersion {
                id: "mv1".to_string(),
                model_name: "performance_predictor".to_string(),
                version: "v1.0".to_string(),
                parameters: ModelParameters::default(),
                hyperparameters: Default::default(),
                metrics: Default::default(),
                is_production: true,
                previous_version: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // Still cached
        assert_eq!(model.current_parameters().await.unwrap().version, HEURISTIC_VERSION);

        model.invalidate_cache();
        assert_eq!(model.current_parameters().await.unwrap().version, "v1.0");
    }

    #[tokio::test]
    async fn test_unknown_creator() {
        let (_, model) = setup().await;
        assert!(model.predict_for("ghost", "k1").await.unwrap_err().is_not_found());
        assert!(model.predict_for("c1", "ghost").await.unwrap_err().is_not_found());
    }
}
