//! Scoring engine façade.
//!
//! Owns one instance of every component, wires their shared dependencies,
//! and exposes composite match scoring plus the weekly and monthly jobs.

use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::audience::AudienceEngine;
use crate::batch::BatchSummary;
use crate::config::EngineConfig;
use crate::embedding::{EmbeddingEngine, EmbeddingProvider, HttpEmbeddingProvider};
use crate::error::{EngineError, EngineResult};
use crate::feedback::{FeedbackLoop, Insight, ModelAccuracy};
use crate::fraud::{risk_from_signals, FraudDetector};
use crate::metrics::JobMetrics;
use crate::models::aggregator::{prediction_signal, quality_signal, similarity_signal, CompositeBreakdown, SignalScores};
use crate::models::{ParameterCache, PredictionModel, ScoreAggregator};
use crate::optimizer::{snapshot_features, OptimizationOutcome, OptimizeOptions, WeightOptimizer, REASON_ALREADY_RUNNING};
use crate::quality::QualityEngine;
use crate::retraining::{RetrainingPipeline, RetrainingReport, RollbackReport};
use crate::store::Store;
use crate::types::feedback::{CampaignSnapshot, CreatorSnapshot};
use crate::types::{
    Campaign, CampaignOutcome, FeedbackRecord, FraudAnalysis, Prediction, QualityIndex, QualityTrend,
    ScoringWeightConfig,
};

/// Composite score for one (creator, campaign) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScore {
    pub creator_id: String,
    pub campaign_id: String,
    /// Composite score (0 - 100)
    pub score: f64,
    pub breakdown: CompositeBreakdown,
    pub fraud_risk: f64,
    /// Pair scored with the tuned match weights for the campaign category (0 - 100)
    pub weighted_fit: f64,
    /// Sub-signals that fell back to their neutral default
    pub degraded: Vec<String>,
}

/// Outcome of one job inside a scheduled run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: String,
    pub summary: Option<BatchSummary>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    /// Set when the run did not start
    pub skipped: Option<String>,
    pub jobs: Vec<JobOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub skipped: Option<String>,
    pub retraining: Option<RetrainingReport>,
    pub error: Option<String>,
}

pub struct ScoringEngine {
    store: Arc<dyn Store>,
    config: EngineConfig,
    embedding: Arc<EmbeddingEngine>,
    fraud: Arc<FraudDetector>,
    quality: Arc<QualityEngine>,
    audience: Arc<AudienceEngine>,
    prediction: Arc<PredictionModel>,
    optimizer: Arc<WeightOptimizer>,
    feedback: FeedbackLoop,
    retraining: RetrainingPipeline,
    aggregator: ScoreAggregator,
    metrics: Arc<JobMetrics>,
    weekly_running: Mutex<()>,
    monthly_running: Mutex<()>,
}

impl ScoringEngine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig, provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        let embedding = Arc::new(EmbeddingEngine::new(store.clone(), provider, config.embedding.dimensions));
        let fraud = Arc::new(FraudDetector::new(store.clone(), config.fraud.thresholds.clone()));
        let quality = Arc::new(QualityEngine::new(store.clone(), fraud.clone(), config.quality.clone()));
        let audience = Arc::new(AudienceEngine::new(store.clone()));
        let prediction = Arc::new(PredictionModel::new(
            store.clone(),
            Arc::new(ParameterCache::new()),
            config.prediction.model_name.clone(),
        ));
        let optimizer = Arc::new(WeightOptimizer::new(store.clone()));
        let feedback = FeedbackLoop::new(store.clone());
        let retraining = RetrainingPipeline::new(
            store.clone(),
            prediction.clone(),
            optimizer.clone(),
            config.retraining.clone(),
            OptimizeOptions::from_config(&config.optimizer),
        );

        Self {
            store,
            config,
            embedding,
            fraud,
            quality,
            audience,
            prediction,
            optimizer,
            feedback,
            retraining,
            aggregator: ScoreAggregator::default(),
            metrics: Arc::new(JobMetrics::new()),
            weekly_running: Mutex::new(()),
            monthly_running: Mutex::new(()),
        }
    }

    /// Build the engine with the HTTP embedding provider when one is configured
    pub fn from_config(store: Arc<dyn Store>, config: EngineConfig) -> Result<Self> {
        let provider = HttpEmbeddingProvider::from_config(&config.embedding)?
            .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>);
        match &provider {
            Some(p) => info!(model = %p.model_name(), "Embedding provider configured"),
            None => info!("No embedding provider configured, using local embeddings"),
        }
        Ok(Self::new(store, config, provider))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<JobMetrics> {
        self.metrics.clone()
    }

    pub fn embedding(&self) -> &EmbeddingEngine {
        &self.embedding
    }

    pub fn prediction(&self) -> &PredictionModel {
        &self.prediction
    }

    // Single-entity operations

    pub async fn compute_cqi(&self, creator_id: &str) -> EngineResult<QualityIndex> {
        let index = self.quality.compute_cqi(creator_id).await?;
        self.metrics.record_cqi(index.score);
        Ok(index)
    }

    pub async fn quality_trend(&self, creator_id: &str) -> EngineResult<QualityTrend> {
        self.quality.trend(creator_id).await
    }

    pub async fn analyze_fraud(&self, creator_id: &str) -> EngineResult<FraudAnalysis> {
        self.fraud.analyze_creator(creator_id).await
    }

    pub async fn predict(&self, creator_id: &str, campaign_id: &str) -> EngineResult<Prediction> {
        self.prediction.predict_for(creator_id, campaign_id).await
    }

    pub async fn record_feedback(&self, outcome: CampaignOutcome) -> EngineResult<FeedbackRecord> {
        self.feedback.record_campaign_feedback(outcome).await
    }

    pub async fn model_accuracy(&self, model_version: Option<&str>) -> EngineResult<ModelAccuracy> {
        self.feedback.get_model_accuracy(model_version).await
    }

    pub async fn improvement_insights(&self) -> EngineResult<Vec<Insight>> {
        self.feedback.get_improvement_insights().await
    }

    pub async fn optimize_weights(&self, options: OptimizeOptions) -> EngineResult<OptimizationOutcome> {
        self.optimizer.optimize_weights(options).await
    }

    pub async fn rollback_weights(&self, run_id: &str) -> EngineResult<ScoringWeightConfig> {
        self.optimizer.rollback(run_id).await
    }

    pub async fn retrain(&self, force: bool) -> EngineResult<RetrainingReport> {
        self.retraining.run(force).await
    }

    pub async fn rollback_model(&self, version_id: Option<&str>) -> EngineResult<RollbackReport> {
        self.retraining.rollback(version_id).await
    }

    // Composite scoring

    async fn fraud_risk(&self, creator_id: &str, index: Option<&QualityIndex>) -> f64 {
        if let Some(index) = index {
            return index.fraud_risk_score;
        }
        match self.store.unresolved_fraud_signals(creator_id).await {
            Ok(signals) => risk_from_signals(&signals),
            Err(e) => {
                warn!(creator_id = %creator_id, error = %e, "Fraud signal lookup failed, no penalty applied");
                0.0
            }
        }
    }

    async fn quality_part(&self, creator_id: &str) -> EngineResult<(f64, Option<QualityIndex>)> {
        let Some(index) = self.store.get_quality_index(creator_id).await? else {
            return Err(EngineError::not_found("QualityIndex", creator_id));
        };
        let trend = self.quality.trend(creator_id).await.unwrap_or_else(|e| {
            warn!(creator_id = %creator_id, error = %e, "CQI trend unavailable, assuming stable");
            QualityTrend::Stable
        });
        Ok((quality_signal(index.score, trend), Some(index)))
    }

    /// Composite match score with graceful degradation.
    ///
    /// Unknown creator or campaign ids are errors. Any sub-signal that cannot
    /// be computed takes its neutral default and is listed in `degraded`.
    pub async fn match_score(&self, creator_id: &str, campaign_id: &str) -> EngineResult<MatchScore> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Campaign", campaign_id))?;
        if self.store.get_creator(creator_id).await?.is_none() {
            return Err(EngineError::not_found("Creator", creator_id));
        }
        self.score_pair(creator_id, &campaign).await
    }

    async fn score_pair(&self, creator_id: &str, campaign: &Campaign) -> EngineResult<MatchScore> {
        let (semantic, quality, audience, prediction) = tokio::join!(
            self.embedding.similarity(creator_id, &campaign.id),
            self.quality_part(creator_id),
            self.audience.fit_for(creator_id, campaign),
            self.prediction.predict(creator_id, campaign),
        );

        let mut signals = SignalScores::NEUTRAL;
        let mut degraded = Vec::new();
        let mut index = None;

        match semantic {
            Ok(similarity) => signals.semantic = similarity_signal(similarity),
            Err(e) => degrade(&mut degraded, "semantic", creator_id, &e),
        }
        match quality {
            Ok((score, q)) => {
                signals.quality = score;
                index = q;
            }
            Err(e) => degrade(&mut degraded, "quality", creator_id, &e),
        }
        match audience {
            Ok(fit) => signals.audience = fit,
            Err(e) => degrade(&mut degraded, "audience", creator_id, &e),
        }
        match prediction {
            Ok(p) => signals.prediction = prediction_signal(&p),
            Err(e) => degrade(&mut degraded, "prediction", creator_id, &e),
        }

        let weighted_fit = match self.weighted_fit(creator_id, campaign, index.as_ref()).await {
            Ok(fit) => fit,
            Err(e) => {
                degrade(&mut degraded, "weighted_fit", creator_id, &e);
                50.0
            }
        };

        let fraud_risk = self.fraud_risk(creator_id, index.as_ref()).await;
        let breakdown = self.aggregator.aggregate(signals, fraud_risk);
        self.metrics.record_match_score(breakdown.score);

        Ok(MatchScore {
            creator_id: creator_id.to_string(),
            campaign_id: campaign.id.clone(),
            score: breakdown.score,
            breakdown,
            fraud_risk,
            weighted_fit,
            degraded,
        })
    }

    /// Live creator and campaign scored with the weights the optimizer
    /// currently has in effect for the campaign category
    async fn weighted_fit(&self, creator_id: &str, campaign: &Campaign, index: Option<&QualityIndex>) -> EngineResult<f64> {
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", creator_id))?;
        let weights = self.optimizer.current_weights(Some(&campaign.category)).await?;
        let features = snapshot_features(
            &CreatorSnapshot::capture(&creator, index.map(|q| q.score)),
            &CampaignSnapshot::from(campaign),
        );
        Ok((weights.score(&features) * 100.0).clamp(0.0, 100.0))
    }

    /// Best-scoring creators for a campaign.
    ///
    /// Candidates come from semantic search, or the first creators in the
    /// store when no bios are embedded yet.
    pub async fn top_matches(&self, campaign_id: &str, limit: usize) -> EngineResult<Vec<MatchScore>> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Campaign", campaign_id))?;
        let pool = limit.saturating_mul(3).max(limit);

        let mut candidates: Vec<String> = self
            .embedding
            .find_similar(campaign_id, pool)
            .await?
            .into_iter()
            .map(|s| s.creator_id)
            .collect();
        if candidates.is_empty() {
            candidates = self
                .store
                .list_creators(0, pool)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
        }

        let campaign = &campaign;
        let scored = join_all(candidates.iter().map(|id| async move { self.score_pair(id, campaign).await })).await;

        let mut matches: Vec<MatchScore> = candidates
            .iter()
            .zip(scored)
            .filter_map(|(id, result)| match result {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!(creator_id = %id, campaign_id = %campaign_id, error = %e, "Candidate scoring failed");
                    None
                }
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(limit);
        Ok(matches)
    }

    // Scheduled jobs

    async fn timed<F>(&self, job: &str, fut: F) -> JobOutcome
    where
        F: Future<Output = EngineResult<BatchSummary>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let elapsed = start.elapsed();
        self.metrics.record_job(job, elapsed, result.as_ref().ok());

        match result {
            Ok(summary) => {
                info!(
                    job = %job,
                    processed = summary.processed,
                    errors = summary.errors,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job finished"
                );
                JobOutcome {
                    job: job.to_string(),
                    summary: Some(summary),
                    error: None,
                    duration_ms: elapsed.as_millis() as u64,
                }
            }
            Err(e) => {
                error!(job = %job, error = %e, "Job failed");
                JobOutcome {
                    job: job.to_string(),
                    summary: None,
                    error: Some(e.to_string()),
                    duration_ms: elapsed.as_millis() as u64,
                }
            }
        }
    }

    /// CQI, fraud, audience and embedding passes.
    ///
    /// Each job reports independently; one failing job never stops the
    /// others.
    pub async fn run_weekly_jobs(&self) -> WeeklyReport {
        let Ok(_guard) = self.weekly_running.try_lock() else {
            warn!("Weekly jobs still running, skipping this trigger");
            return WeeklyReport {
                skipped: Some(REASON_ALREADY_RUNNING.to_string()),
                jobs: Vec::new(),
            };
        };
        let page_size = self.config.scheduler.page_size;
        info!(page_size, "Starting weekly jobs");

        // Fraud first: CQI runs the detectors too, and two concurrent passes
        // over one creator could both insert the same signal type
        let fraud = self.timed("fraud", self.fraud.analyze_all(page_size)).await;
        let (cqi, audience, embeddings) = tokio::join!(
            self.timed("cqi", self.quality.compute_all(page_size)),
            self.timed("audience", self.audience.compute_all(page_size)),
            self.timed("embeddings", self.embedding.embed_all(page_size)),
        );

        WeeklyReport {
            skipped: None,
            jobs: vec![cqi, fraud, audience, embeddings],
        }
    }

    /// Retraining pipeline (with weight optimization after a deploy)
    pub async fn run_monthly_jobs(&self) -> MonthlyReport {
        let Ok(_guard) = self.monthly_running.try_lock() else {
            warn!("Monthly jobs still running, skipping this trigger");
            return MonthlyReport {
                skipped: Some(REASON_ALREADY_RUNNING.to_string()),
                retraining: None,
                error: None,
            };
        };
        info!("Starting monthly jobs");

        let start = Instant::now();
        let result = self.retraining.run(false).await;
        let elapsed = start.elapsed();

        match result {
            Ok(report) => {
                self.metrics.record_job(
                    "retraining",
                    elapsed,
                    Some(&BatchSummary {
                        processed: usize::from(report.success),
                        errors: 0,
                    }),
                );
                info!(
                    success = report.success,
                    reason = ?report.reason,
                    version = ?report.model_version,
                    "Retraining finished"
                );
                MonthlyReport {
                    skipped: None,
                    retraining: Some(report),
                    error: None,
                }
            }
            Err(e) => {
                self.metrics.record_job("retraining", elapsed, None);
                error!(error = %e, "Retraining failed");
                MonthlyReport {
                    skipped: None,
                    retraining: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn degrade(degraded: &mut Vec<String>, signal: &str, creator_id: &str, error: &EngineError) {
    warn!(creator_id = %creator_id, signal = %signal, error = %error, "Sub-signal unavailable, using neutral default");
    degraded.push(signal.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::weights::config_name;
    use crate::DEFAULT_WEIGHTS;
    use chrono::Utc;
    use crate::types::Creator;

    async fn engine() -> (Arc<MemoryStore>, ScoringEngine) {
        let store = Arc::new(MemoryStore::new());
        let mut creator = Creator::new("c1", "fitness", 25_000, 3.1).with_track_record(5, 6, 4.5, 88.0);
        creator.bio = Some("Strength coach sharing home workouts and meal prep".to_string());
        store.insert_creator(creator).await;
        store
            .insert_creator(Creator::new("c2", "gaming", 400_000, 1.0))
            .await;
        store
            .insert_campaign(
                Campaign::new("k1", "fitness", 1_500.0).with_text("Protein launch", "Home workout creators wanted"),
            )
            .await;
        let engine = ScoringEngine::new(store.clone(), EngineConfig::default(), None);
        (store, engine)
    }

    #[tokio::test]
    async fn test_match_score_degrades_without_cqi() {
        let (_, engine) = engine().await;
        let result = engine.match_score("c1", "k1").await.unwrap();

        assert_eq!(result.degraded, vec!["quality".to_string()]);
        assert_eq!(result.breakdown.signals.quality, 50.0);
        assert!((0.0..=100.0).contains(&result.score));
    }

    #[tokio::test]
    async fn test_match_score_uses_cqi_when_present() {
        let (_, engine) = engine().await;
        let index = engine.compute_cqi("c1").await.unwrap();
        let result = engine.match_score("c1", "k1").await.unwrap();

        assert!(result.degraded.is_empty());
        assert!((result.breakdown.signals.quality - index.score).abs() < 1e-9);
        assert_eq!(result.fraud_risk, index.fraud_risk_score);
    }

    #[tokio::test]
    async fn test_match_score_unknown_ids() {
        let (_, engine) = engine().await;
        assert!(engine.match_score("ghost", "k1").await.unwrap_err().is_not_found());
        assert!(engine.match_score("c1", "ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_weekly_jobs_report_every_job() {
        let (store, engine) = engine().await;
        let report = engine.run_weekly_jobs().await;

        assert!(report.skipped.is_none());
        let names: Vec<&str> = report.jobs.iter().map(|j| j.job.as_str()).collect();
        assert_eq!(names, vec!["cqi", "fraud", "audience", "embeddings"]);
        for job in &report.jobs {
            assert!(job.error.is_none(), "{} failed: {:?}", job.job, job.error);
        }
        assert!(store.get_quality_index("c2").await.unwrap().is_some());
        assert!(store.get_audience_profile("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_top_matches_ranked() {
        let (_, engine) = engine().await;
        engine.run_weekly_jobs().await;

        let matches = engine.top_matches("k1", 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].score >= matches[1].score);
        assert_eq!(matches[0].creator_id, "c1");
    }

    #[tokio::test]
    async fn test_monthly_jobs_skip_without_data() {
        let (_, engine) = engine().await;
        let report = engine.run_monthly_jobs().await;
        let retraining = report.retraining.unwrap();
        assert!(!retraining.success);
        assert!(retraining.reason.is_some());
    }

    #[tokio::test]
    async fn test_weighted_fit_follows_stored_weights() {
        let (store, engine) = engine().await;
        let before = engine.match_score("c1", "k1").await.unwrap();
        assert!((0.0..=100.0).contains(&before.weighted_fit));

        // Shift weight from quality (neutral 0.5 without a CQI) onto the
        // shared category
        let mut weights = DEFAULT_WEIGHTS.to_map();
        weights.insert("category_match".to_string(), 0.25);
        weights.insert("quality".to_string(), 0.10);
        store
            .upsert_weight_config(ScoringWeightConfig {
                name: config_name(Some("fitness")),
                category: Some("fitness".to_string()),
                weights,
                campaigns_used: 30,
                avg_success_rate: 0.6,
                optimization_log: vec![],
                is_active: true,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let after = engine.match_score("c1", "k1").await.unwrap();
        assert!((after.weighted_fit - before.weighted_fit - 2.5).abs() < 1e-9);
        assert_eq!(after.score, before.score);
    }

    #[tokio::test]
    async fn test_overlapping_weekly_run_is_skipped() {
        let (store, engine) = engine().await;
        let held = engine.weekly_running.lock().await;
        let report = engine.run_weekly_jobs().await;

        assert_eq!(report.skipped.as_deref(), Some(REASON_ALREADY_RUNNING));
        assert!(report.jobs.is_empty());
        assert!(store.get_quality_index("c1").await.unwrap().is_none());
        assert!(store.get_audience_profile("c1").await.unwrap().is_none());
        drop(held);
    }

    #[tokio::test]
    async fn test_overlapping_monthly_run_is_skipped() {
        let (store, engine) = engine().await;
        let held = engine.monthly_running.lock().await;
        let report = engine.run_monthly_jobs().await;

        assert_eq!(report.skipped.as_deref(), Some(REASON_ALREADY_RUNNING));
        assert!(report.retraining.is_none());
        assert!(report.error.is_none());
        let model_name = &engine.config().prediction.model_name;
        assert!(store.list_model_versions(model_name).await.unwrap().is_empty());
        drop(held);
    }
}
