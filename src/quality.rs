//! Creator Quality Index (CQI).
//!
//! Six sub-scores are normalized to [0, 100] against tier-relative
//! benchmarks and combined with fixed weights that sum to 0.90. The remaining
//! 0.10 is reserved for fraud: risk is subtracted from the weighted sum rather
//! than blended into it, so strong sub-scores cannot mask fraud.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::{run_page, BatchSummary};
use crate::config::QualityConfig;
use crate::error::{EngineError, EngineResult};
use crate::fraud::FraudDetector;
use crate::store::Store;
use crate::types::{Creator, QualityIndex, QualitySnapshot, QualityTrend, SubScores};

/// Fixed CQI weights
#[derive(Debug, Clone, Copy)]
pub struct CqiWeights {
    pub engagement_consistency: f64,
    pub growth_stability: f64,
    pub comment_authenticity: f64,
    pub posting_frequency: f64,
    pub niche_authority: f64,
    pub audience_retention: f64,
    /// Reserved share, applied as a subtraction of `fraud_risk x 100 x fraud_penalty`
    pub fraud_penalty: f64,
}

pub const CQI_WEIGHTS: CqiWeights = CqiWeights {
    engagement_consistency: 0.20,
    growth_stability: 0.15,
    comment_authenticity: 0.20,
    posting_frequency: 0.10,
    niche_authority: 0.10,
    audience_retention: 0.15,
    fraud_penalty: 0.10,
};

/// Single-period growth above this caps the stability score
const SUSPICIOUS_GROWTH: f64 = 0.20;
/// Snapshot score change that counts as a trend
const TREND_DELTA: f64 = 3.0;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// 60% history coefficient of variation, 40% tier-relative absolute engagement
pub fn engagement_consistency(creator: &Creator) -> f64 {
    let history = creator.engagement_history();
    let history_mean = mean(&history);
    let cv_score = if history.len() >= 2 && history_mean > 0.0 {
        let cv = std_dev(&history) / history_mean;
        (1.0 - cv.min(1.0)) * 100.0
    } else {
        50.0
    };

    let typical = creator.tier().benchmark().typical;
    let absolute_score = (creator.engagement_rate / typical * 70.0).clamp(0.0, 100.0);

    (cv_score * 0.6 + absolute_score * 0.4).clamp(0.0, 100.0)
}

/// Penalizes volatile or shrinking audiences; any spike over 20% caps the score
pub fn growth_stability(creator: &Creator) -> f64 {
    let rates = creator.growth_rates();
    if rates.is_empty() {
        return 60.0;
    }

    let spike = rates.iter().copied().fold(f64::MIN, f64::max);
    if spike > SUSPICIOUS_GROWTH {
        return (50.0 - spike * 100.0).max(10.0);
    }

    let avg = mean(&rates);
    let shrink_penalty = if avg < 0.0 { avg.abs() * 200.0 } else { 0.0 };
    (100.0 - std_dev(&rates) * 400.0 - shrink_penalty).clamp(0.0, 100.0)
}

/// Rewards engagement inside the tier band; below-band is punished harder than above-band
pub fn comment_authenticity(creator: &Creator) -> f64 {
    let band = creator.tier().benchmark();
    let er = creator.engagement_rate.max(0.0);

    if er < band.floor {
        // Inflated audience
        let ratio = er / band.floor;
        70.0 * ratio * ratio
    } else if er > band.ceiling {
        // Engagement pods
        let excess = (er - band.ceiling) / band.ceiling;
        (70.0 - excess * 50.0).max(20.0)
    } else {
        let closeness = 1.0 - (er - band.typical).abs() / (band.ceiling - band.floor);
        (70.0 + 30.0 * closeness).clamp(0.0, 100.0)
    }
}

/// 3-7 posts per week is ideal
pub fn posting_frequency(creator: &Creator) -> f64 {
    if creator.metrics_history.is_empty() {
        return 50.0;
    }
    let posts: Vec<f64> = creator.metrics_history.iter().map(|s| s.post_count as f64).collect();
    let weekly = mean(&posts);

    if weekly < 3.0 {
        weekly / 3.0 * 100.0
    } else if weekly <= 7.0 {
        100.0
    } else {
        (100.0 - (weekly - 7.0) * 8.0).max(30.0)
    }
}

pub fn niche_authority(creator: &Creator) -> f64 {
    let rating = (creator.rating / 5.0).clamp(0.0, 1.0) * 40.0;
    let campaigns = (creator.completed_campaigns as f64 * 3.0).min(30.0);
    let reliability = (creator.reliability_score / 100.0).clamp(0.0, 1.0) * 20.0;
    let category = if creator.category.is_empty() { 0.0 } else { 10.0 };
    (rating + campaigns + reliability + category).clamp(0.0, 100.0)
}

/// Share of periods without follower loss, blended with campaign completion
pub fn audience_retention(creator: &Creator) -> f64 {
    let rates = creator.growth_rates();
    let completion = creator.completion_rate.clamp(0.0, 100.0);

    if !rates.is_empty() {
        let retained = rates.iter().filter(|r| **r >= -0.01).count() as f64 / rates.len() as f64;
        retained * 50.0 + completion * 0.5
    } else if creator.total_campaigns > 0 {
        completion
    } else {
        50.0
    }
}

pub fn compute_subscores(creator: &Creator) -> SubScores {
    SubScores {
        engagement_consistency: engagement_consistency(creator),
        growth_stability: growth_stability(creator),
        comment_authenticity: comment_authenticity(creator),
        posting_frequency: posting_frequency(creator),
        niche_authority: niche_authority(creator),
        audience_retention: audience_retention(creator),
    }
}

/// Weighted sum of sub-scores (at most 90)
pub fn weighted_sum(s: &SubScores) -> f64 {
    let w = CQI_WEIGHTS;
    s.engagement_consistency * w.engagement_consistency
        + s.growth_stability * w.growth_stability
        + s.comment_authenticity * w.comment_authenticity
        + s.posting_frequency * w.posting_frequency
        + s.niche_authority * w.niche_authority
        + s.audience_retention * w.audience_retention
}

/// Final CQI: weighted sum minus the fraud penalty, clamped to [0, 100]
pub fn final_score(subscores: &SubScores, fraud_risk: f64) -> f64 {
    let penalty = fraud_risk.clamp(0.0, 1.0) * CQI_WEIGHTS.fraud_penalty * 100.0;
    (weighted_sum(subscores) - penalty).clamp(0.0, 100.0)
}

/// Trend from a chronological score series
pub fn trend_of(scores: &[f64]) -> QualityTrend {
    let Some((latest, earlier)) = scores.split_last() else {
        return QualityTrend::Stable;
    };
    if earlier.is_empty() {
        return QualityTrend::Stable;
    }
    let window = &earlier[earlier.len().saturating_sub(4)..];
    let delta = latest - mean(window);
    if delta >= TREND_DELTA {
        QualityTrend::Rising
    } else if delta <= -TREND_DELTA {
        QualityTrend::Declining
    } else {
        QualityTrend::Stable
    }
}

/// CQI computation service
pub struct QualityEngine {
    store: Arc<dyn Store>,
    fraud: Arc<FraudDetector>,
    config: QualityConfig,
}

impl QualityEngine {
    pub fn new(store: Arc<dyn Store>, fraud: Arc<FraudDetector>, config: QualityConfig) -> Self {
        Self { store, fraud, config }
    }

    /// Compute, persist and snapshot a creator's CQI
    pub async fn compute_cqi(&self, creator_id: &str) -> EngineResult<QualityIndex> {
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", creator_id))?;

        let fraud_risk = match self.fraud.analyze_creator(creator_id).await {
            Ok(analysis) => analysis.fraud_risk_score,
            Err(e) => {
                let previous = self
                    .store
                    .get_quality_index(creator_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|q| q.fraud_risk_score)
                    .unwrap_or(0.0);
                warn!(
                    creator_id = %creator_id,
                    error = %e,
                    fallback = previous,
                    "Fraud analysis failed, reusing previous risk"
                );
                previous
            }
        };

        let subscores = compute_subscores(&creator);
        let score = final_score(&subscores, fraud_risk);
        let data_points = creator.metrics_history.len() as u32 + creator.total_campaigns;
        let confidence = (data_points as f64 / self.config.full_confidence_points.max(1) as f64).min(1.0);

        let index = QualityIndex {
            creator_id: creator_id.to_string(),
            score,
            subscores,
            fraud_risk_score: fraud_risk.clamp(0.0, 1.0),
            confidence,
            data_points,
            computed_at: Utc::now(),
        };

        self.store.upsert_quality_index(index.clone()).await?;
        self.store.append_quality_snapshot(QualitySnapshot::from(&index)).await?;
        self.store.set_creator_ai_score(creator_id, score).await?;

        debug!(
            creator_id = %creator_id,
            score = score,
            fraud_risk = fraud_risk,
            confidence = confidence,
            "CQI computed"
        );
        Ok(index)
    }

    /// Direction of the creator's CQI over recent snapshots
    pub async fn trend(&self, creator_id: &str) -> EngineResult<QualityTrend> {
        let history = self
            .store
            .quality_history(creator_id, self.config.trend_window)
            .await?;
        let scores: Vec<f64> = history.iter().map(|s| s.score).collect();
        Ok(trend_of(&scores))
    }

    /// Recompute CQI for every creator, page by page
    pub async fn compute_all(&self, page_size: usize) -> EngineResult<BatchSummary> {
        let page_size = page_size.max(1);
        let mut summary = BatchSummary::default();
        let mut offset = 0;

        loop {
            let page = self.store.list_creators(offset, page_size).await?;
            let count = page.len();
            run_page(
                "cqi",
                page.into_iter().map(|c| c.id),
                |id| async move { self.compute_cqi(&id).await },
                &mut summary,
            )
            .await;
            offset += count;
            if count < page_size {
                break;
            }
        }

        info!(processed = summary.processed, errors = summary.errors, "CQI pass complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::fraud::RecommendationThresholds;
    use crate::types::MetricSnapshot;
    use chrono::Duration;

    fn weekly(points: &[(u64, f64, u32)]) -> Vec<MetricSnapshot> {
        let start = Utc::now() - Duration::weeks(points.len() as i64);
        points
            .iter()
            .enumerate()
            .map(|(i, (f, er, posts))| MetricSnapshot::new(start + Duration::weeks(i as i64), *f, *er, *posts))
            .collect()
    }

    fn engine(store: Arc<MemoryStore>) -> QualityEngine {
        let fraud = Arc::new(FraudDetector::new(store.clone(), RecommendationThresholds::default()));
        QualityEngine::new(store, fraud, QualityConfig::default())
    }

    #[test]
    fn test_weights_reserve_fraud_share() {
        let w = CQI_WEIGHTS;
        let contributive = w.engagement_consistency
            + w.growth_stability
            + w.comment_authenticity
            + w.posting_frequency
            + w.niche_authority
            + w.audience_retention;
        assert!((contributive - 0.90).abs() < 1e-12);
        assert!((contributive + w.fraud_penalty - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_growth_spike_caps_stability() {
        let creator = Creator::new("c1", "tech", 1_300, 3.0).with_history(weekly(&[(1_000, 3.0, 3), (1_300, 3.0, 3)]));
        // 30% spike -> max(10, 50 - 30)
        assert!((growth_stability(&creator) - 20.0).abs() < 1e-9);

        let huge = Creator::new("c2", "tech", 3_000, 3.0).with_history(weekly(&[(1_000, 3.0, 3), (3_000, 3.0, 3)]));
        assert_eq!(growth_stability(&huge), 10.0);
    }

    #[test]
    fn test_authenticity_is_asymmetric() {
        let inside = comment_authenticity(&Creator::new("a", "tech", 5_000, 4.0));
        let below = comment_authenticity(&Creator::new("b", "tech", 5_000, 0.75));
        let above = comment_authenticity(&Creator::new("c", "tech", 5_000, 15.0));

        assert_eq!(inside, 100.0);
        assert!(below < above);
        assert!(above < inside);
    }

    #[test]
    fn test_consistency_blend() {
        let steady = Creator::new("c1", "tech", 5_000, 4.0).with_history(weekly(&[(5_000, 4.0, 3), (5_000, 4.0, 3)]));
        // cv = 0 -> 100 * 0.6 + (4/4 * 70) * 0.4
        assert!((engagement_consistency(&steady) - 88.0).abs() < 1e-9);
    }

    #[test]
    fn test_final_score_bounds() {
        let perfect = SubScores {
            engagement_consistency: 100.0,
            growth_stability: 100.0,
            comment_authenticity: 100.0,
            posting_frequency: 100.0,
            niche_authority: 100.0,
            audience_retention: 100.0,
        };
        assert!((final_score(&perfect, 0.0) - 90.0).abs() < 1e-9);
        assert!((final_score(&perfect, 1.0) - 80.0).abs() < 1e-9);
        assert_eq!(final_score(&SubScores::default(), 1.0), 0.0);
    }

    #[test]
    fn test_trend_of() {
        assert_eq!(trend_of(&[]), QualityTrend::Stable);
        assert_eq!(trend_of(&[50.0]), QualityTrend::Stable);
        assert_eq!(trend_of(&[50.0, 52.0, 60.0]), QualityTrend::Rising);
        assert_eq!(trend_of(&[70.0, 68.0, 60.0]), QualityTrend::Declining);
        assert_eq!(trend_of(&[60.0, 61.0]), QualityTrend::Stable);
    }

    #[tokio::test]
    async fn test_compute_cqi_persists_and_writes_back() {
        let store = Arc::new(MemoryStore::new());
        let creator = Creator::new("c1", "fitness", 30_000, 2.6)
            .with_history(weekly(&[(28_000, 2.4, 4), (29_000, 2.7, 5), (30_000, 2.6, 4)]))
            .with_track_record(8, 10, 4.5, 90.0);
        store.insert_creator(creator).await;

        let cqi = engine(store.clone()).compute_cqi("c1").await.unwrap();

        assert!((0.0..=100.0).contains(&cqi.score));
        assert!((0.0..=1.0).contains(&cqi.fraud_risk_score));
        assert_eq!(cqi.data_points, 13);
        assert!((cqi.confidence - 0.65).abs() < 1e-9);

        let stored = store.get_quality_index("c1").await.unwrap().unwrap();
        assert_eq!(stored.score, cqi.score);
        assert_eq!(store.quality_history("c1", 10).await.unwrap().len(), 1);
        assert_eq!(store.get_creator("c1").await.unwrap().unwrap().ai_score, Some(cqi.score));
    }

    #[tokio::test]
    async fn test_fraud_risk_lowers_score() {
        let store = Arc::new(MemoryStore::new());
        store.insert_creator(Creator::new("clean", "beauty", 5_000, 4.0)).await;
        store.insert_creator(Creator::new("suspect", "beauty", 5_000, 0.4)).await;
        let engine = engine(store);

        let clean = engine.compute_cqi("clean").await.unwrap();
        let suspect = engine.compute_cqi("suspect").await.unwrap();

        assert_eq!(clean.fraud_risk_score, 0.0);
        assert!(suspect.fraud_risk_score > 0.0);
        assert!(suspect.score < clean.score);
    }

    #[tokio::test]
    async fn test_compute_all_counts_creators() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..7 {
            store.insert_creator(Creator::new(format!("c{}", i), "tech", 12_000, 2.0)).await;
        }

        let summary = engine(store.clone()).compute_all(3).await.unwrap();
        assert_eq!(summary, BatchSummary { processed: 7, errors: 0 });
    }

    #[tokio::test]
    async fn test_unknown_creator() {
        let err = engine(Arc::new(MemoryStore::new())).compute_cqi("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
