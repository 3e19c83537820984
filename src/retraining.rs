//! Prediction model retraining pipeline.
//!
//! Runs CHECK -> COLLECT -> TRAIN -> VALIDATE -> DEPLOY | REJECT, then
//! OPTIMIZE_WEIGHTS after a deploy. Each stage appends a line to the report
//! log. Training uses a simplified linear engagement model over the six
//! [`TRAINING_FEATURES`]; it is deliberately not the heuristic the live
//! prediction path runs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::RetrainingConfig;
use crate::error::{EngineError, EngineResult};
use crate::feature_extractor::{category_match, follower_tier_feature, price_efficiency, PredictionFeatures, TRAINING_FEATURES};
use crate::feedback::accuracy_of;
use crate::models::params::{ModelParameters, FEATURE_WEIGHT_BOUNDS};
use crate::models::PredictionModel;
use crate::optimizer::{OptimizationOutcome, OptimizeOptions, WeightOptimizer, REASON_ALREADY_RUNNING};
use crate::store::Store;
use crate::types::model_version::{Hyperparameters, ModelMetrics};
use crate::types::{FeedbackFilter, FeedbackRecord, ModelVersion};

pub const FIRST_VERSION: &str = "v1.0";

/// Share of the dataset used for training; the rest is held out
pub const TRAIN_SPLIT: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Check,
    Collect,
    Train,
    Validate,
    Deploy,
    Reject,
    OptimizeWeights,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Check => "CHECK",
            PipelineStage::Collect => "COLLECT",
            PipelineStage::Train => "TRAIN",
            PipelineStage::Validate => "VALIDATE",
            PipelineStage::Deploy => "DEPLOY",
            PipelineStage::Reject => "REJECT",
            PipelineStage::OptimizeWeights => "OPTIMIZE_WEIGHTS",
            PipelineStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub metrics: ModelMetrics,
    /// Production model MAE on the same held-out split
    pub current_mae: Option<f64>,
    pub improved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainingReport {
    pub success: bool,
    pub reason: Option<String>,
    /// Last stage entered
    pub stage: PipelineStage,
    /// Version string of the model trained in this run
    pub model_version: Option<String>,
    pub validation: Option<ValidationResult>,
    pub weight_optimization: Option<OptimizationOutcome>,
    pub log: Vec<String>,
}

impl RetrainingReport {
    fn new() -> Self {
        Self {
            success: false,
            reason: None,
            stage: PipelineStage::Check,
            model_version: None,
            validation: None,
            weight_optimization: None,
            log: Vec::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
    }

    fn note(&mut self, line: impl Into<String>) {
        let line = format!("[{}] {}", self.stage, line.into());
        info!(stage = %self.stage, "{}", line);
        self.log.push(line);
    }

    fn stop(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.note(format!("stopping: {}", reason));
        self.success = false;
        self.reason = Some(reason);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    pub success: bool,
    pub reason: Option<String>,
    pub restored_version: Option<String>,
    pub log: Vec<String>,
}

/// Accept a new model if its MAE is within tolerance of the current one,
/// or if there is no current model
pub fn is_improvement(new_mae: f64, current_mae: Option<f64>, tolerance: f64) -> bool {
    match current_mae {
        None => true,
        Some(current) => new_mae < current * tolerance,
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.trim().strip_prefix('v')?.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// `vMAJOR.MINOR` with MINOR rolling over into MAJOR at 10
fn bump((major, minor): (u32, u32)) -> String {
    if minor + 1 >= 10 {
        format!("v{}.0", major + 1)
    } else {
        format!("v{}.{}", major, minor + 1)
    }
}

/// Version after the highest parseable one in `existing`; unparseable
/// strings are skipped so numbering never restarts over stored versions
pub fn next_version<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    let mut skipped = 0;
    let highest = existing
        .into_iter()
        .filter_map(|v| {
            let parsed = parse_version(v);
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .max();
    if skipped > 0 {
        warn!(skipped, "Ignoring unparseable model versions when numbering");
    }
    highest.map(bump).unwrap_or_else(|| FIRST_VERSION.to_string())
}

/// Training-model engagement: 10 x sum(w * x)
pub fn linear_forward(weights: &[f64; 6], features: &[f64; 6]) -> f64 {
    10.0 * weights.iter().zip(features).map(|(w, x)| w * x).sum::<f64>()
}

fn weights_of(params: &ModelParameters) -> [f64; 6] {
    let mut w = [0.0; 6];
    for (i, name) in TRAINING_FEATURES.iter().enumerate() {
        w[i] = params.weight(name);
    }
    w
}

/// Training inputs for a record: the features stored with its prediction,
/// or features rebuilt from the completion snapshots
pub fn training_features(record: &FeedbackRecord) -> [f64; 6] {
    if !record.features.is_empty() {
        return PredictionFeatures::from_map(&record.features).training_vector();
    }
    let creator = &record.creator_snapshot;
    let campaign = &record.campaign_snapshot;
    PredictionFeatures {
        engagement_signal: (creator.engagement_rate / 10.0).clamp(0.0, 1.0),
        follower_tier: follower_tier_feature(creator.follower_count),
        success_ratio: (creator.completion_rate / 100.0).clamp(0.0, 1.0),
        category_match: category_match(&creator.category, &campaign.category),
        price_efficiency: price_efficiency(campaign.budget, creator.follower_count),
        quality: creator.cqi_score.map(|s| s / 100.0).unwrap_or(0.5).clamp(0.0, 1.0),
        ..PredictionFeatures::default()
    }
    .training_vector()
}

type Sample = ([f64; 6], f64);

/// Per-sample weight nudging; weights stay within [`FEATURE_WEIGHT_BOUNDS`]
pub fn train(initial: [f64; 6], samples: &[Sample], epochs: usize, learning_rate: f64) -> [f64; 6] {
    let (lo, hi) = FEATURE_WEIGHT_BOUNDS;
    let mut weights = initial;
    for _ in 0..epochs {
        for (x, y) in samples {
            let error = linear_forward(&weights, x) - y;
            for (w, xi) in weights.iter_mut().zip(x) {
                *w = (*w - learning_rate * error * xi).clamp(lo, hi);
            }
        }
    }
    weights
}

/// MAE, RMSE and R² of the linear model on a sample set
pub fn evaluate(weights: &[f64; 6], samples: &[Sample]) -> ModelMetrics {
    if samples.is_empty() {
        return ModelMetrics::default();
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut total_sq = 0.0;
    for (x, y) in samples {
        let error = linear_forward(weights, x) - y;
        abs_sum += error.abs();
        sq_sum += error * error;
        total_sq += (y - mean) * (y - mean);
    }

    ModelMetrics {
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        r2: if total_sq > 0.0 { 1.0 - sq_sum / total_sq } else { 0.0 },
        validation_samples: samples.len(),
    }
}

/// Monthly retraining job; one run at a time
pub struct RetrainingPipeline {
    store: Arc<dyn Store>,
    prediction: Arc<PredictionModel>,
    optimizer: Arc<WeightOptimizer>,
    config: RetrainingConfig,
    optimize_options: OptimizeOptions,
    running: Mutex<()>,
}

impl RetrainingPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        prediction: Arc<PredictionModel>,
        optimizer: Arc<WeightOptimizer>,
        config: RetrainingConfig,
        optimize_options: OptimizeOptions,
    ) -> Self {
        Self {
            store,
            prediction,
            optimizer,
            config,
            optimize_options,
            running: Mutex::new(()),
        }
    }

    pub async fn run(&self, force: bool) -> EngineResult<RetrainingReport> {
        let mut report = RetrainingReport::new();
        let Ok(_guard) = self.running.try_lock() else {
            return Ok(report.stop(REASON_ALREADY_RUNNING));
        };
        let model_name = self.prediction.model_name().to_string();

        // CHECK
        let latest = self.store.latest_model_version(&model_name).await?;
        let since = latest.as_ref().map(|v| v.created_at);
        let new_samples = self
            .store
            .list_feedback(&FeedbackFilter {
                since,
                ..FeedbackFilter::default()
            })
            .await?
            .len();
        let all = self.store.list_feedback(&FeedbackFilter::default()).await?;
        let accuracy = accuracy_of(&all);
        let degraded = accuracy.sample_count > 0 && accuracy.engagement.accuracy < self.config.accuracy_floor;

        if force {
            report.note("forced retrain requested");
        } else if new_samples >= self.config.min_samples {
            report.note(format!(
                "{} new feedback records since last training (>= {})",
                new_samples, self.config.min_samples
            ));
        } else if degraded {
            report.note(format!(
                "accuracy degraded to {:.3} (< {:.2})",
                accuracy.engagement.accuracy, self.config.accuracy_floor
            ));
        } else {
            return Ok(report.stop(format!(
                "Retraining not needed: {} new samples (< {}), accuracy {:.3}",
                new_samples, self.config.min_samples, accuracy.engagement.accuracy
            )));
        }

        // COLLECT
        report.enter(PipelineStage::Collect);
        let required = self.config.min_samples.max(2);
        if all.len() < required {
            return Ok(report.stop(format!("Insufficient data: {} samples (< {})", all.len(), required)));
        }
        let samples: Vec<Sample> = all
            .iter()
            .map(|r| (training_features(r), r.actual_engagement))
            .collect();
        let split = ((samples.len() as f64 * TRAIN_SPLIT).floor() as usize).clamp(1, samples.len() - 1);
        let (train_set, validation_set) = samples.split_at(split);
        report.note(format!(
            "collected {} records ({} train / {} validation)",
            samples.len(),
            train_set.len(),
            validation_set.len()
        ));

        // TRAIN
        report.enter(PipelineStage::Train);
        let base = self.prediction.current_parameters().await?;
        let trained = train(
            weights_of(&base.params),
            train_set,
            self.config.epochs,
            self.config.learning_rate,
        );
        let mut params = base.params.clone();
        for (name, w) in TRAINING_FEATURES.iter().zip(trained) {
            params.set_weight(name, w);
        }
        report.note(format!(
            "trained {} epochs from {} parameters (lr {})",
            self.config.epochs, base.version, self.config.learning_rate
        ));

        // VALIDATE
        report.enter(PipelineStage::Validate);
        let metrics = evaluate(&trained, validation_set);
        let production = self.store.production_model(&model_name).await?;
        let current_mae = production
            .as_ref()
            .map(|p| evaluate(&weights_of(&p.parameters), validation_set).mae);
        let improved = is_improvement(metrics.mae, current_mae, self.config.improvement_tolerance);
        report.note(format!(
            "mae {:.4}, rmse {:.4}, r2 {:.4}; production mae {}; improved: {}",
            metrics.mae,
            metrics.rmse,
            metrics.r2,
            current_mae.map(|m| format!("{:.4}", m)).unwrap_or_else(|| "none".to_string()),
            improved
        ));
        report.validation = Some(ValidationResult {
            metrics,
            current_mae,
            improved,
        });

        let existing = self.store.list_model_versions(&model_name).await?;
        let version = next_version(existing.iter().map(|v| v.version.as_str()));
        report.model_version = Some(version.clone());
        let deploy = improved || force;
        let candidate = ModelVersion {
            id: uuid::Uuid::new_v4().to_string(),
            model_name: model_name.clone(),
            version: version.clone(),
            parameters: params,
            hyperparameters: Hyperparameters {
                epochs: self.config.epochs,
                learning_rate: self.config.learning_rate,
                train_samples: train_set.len(),
            },
            metrics,
            is_production: false,
            previous_version: production.as_ref().map(|p| p.id.clone()),
            created_at: Utc::now(),
        };

        if !deploy {
            report.enter(PipelineStage::Reject);
            self.store.insert_model_version(candidate).await?;
            report.note(format!("{} stored for audit, production unchanged", version));
            return Ok(report.stop("No improvement"));
        }

        // DEPLOY: the candidate is stored before production changes hands
        report.enter(PipelineStage::Deploy);
        let candidate_id = candidate.id.clone();
        self.store.insert_model_version(candidate).await?;
        let demoted = self.store.demote_production(&model_name).await?;
        let promoted = match self.store.promote_model_version(&candidate_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::not_found("ModelVersion", candidate_id.as_str())),
            Err(e) => Err(EngineError::from(e)),
        };
        if let Err(e) = promoted {
            self.restore_production(production.as_ref()).await;
            self.prediction.invalidate_cache();
            return Err(e);
        }
        self.prediction.invalidate_cache();
        report.note(format!(
            "{} promoted to production ({} version(s) demoted)",
            version, demoted
        ));

        // OPTIMIZE_WEIGHTS
        report.enter(PipelineStage::OptimizeWeights);
        match self.optimizer.optimize_weights(self.optimize_options.clone()).await {
            Ok(outcome) => {
                report.note(match &outcome.reason {
                    Some(reason) => format!("weight optimization skipped: {}", reason),
                    None => format!(
                        "weight optimization improvement {:.2} points (applied: {})",
                        outcome.improvement, outcome.applied
                    ),
                });
                report.weight_optimization = Some(outcome);
            }
            Err(e) => {
                warn!(error = %e, "Weight optimization after deploy failed");
                report.note(format!("weight optimization failed: {}", e));
            }
        }

        report.enter(PipelineStage::Done);
        report.success = true;
        report.note("retraining complete");
        Ok(report)
    }

    /// Re-promote the version that was production before a failed deploy
    async fn restore_production(&self, previous: Option<&ModelVersion>) {
        let Some(previous) = previous else {
            return;
        };
        match self.store.promote_model_version(&previous.id).await {
            Ok(_) => warn!(version = %previous.version, "Deploy failed, previous production version restored"),
            Err(e) => error!(
                version = %previous.version,
                error = %e,
                "Deploy failed and previous production version could not be restored"
            ),
        }
    }

    /// Restore an earlier model version to production.
    ///
    /// Targets `version_id` when given, else the version the current
    /// production model replaced.
    pub async fn rollback(&self, version_id: Option<&str>) -> EngineResult<RollbackReport> {
        let mut log = Vec::new();
        let Ok(_guard) = self.running.try_lock() else {
            return Ok(RollbackReport {
                success: false,
                reason: Some(REASON_ALREADY_RUNNING.to_string()),
                restored_version: None,
                log,
            });
        };
        let model_name = self.prediction.model_name().to_string();

        let target = match version_id {
            Some(id) => {
                let target = self
                    .store
                    .get_model_version(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("ModelVersion", id))?;
                if target.model_name != model_name {
                    return Err(EngineError::Conflict(format!(
                        "model version {} belongs to {}, not {}",
                        id, target.model_name, model_name
                    )));
                }
                target
            }
            None => {
                let previous = match self.store.production_model(&model_name).await? {
                    Some(current) => current.previous_version,
                    None => None,
                };
                let Some(previous_id) = previous else {
                    return Ok(RollbackReport {
                        success: false,
                        reason: Some("No previous version to roll back to".to_string()),
                        restored_version: None,
                        log,
                    });
                };
                self.store
                    .get_model_version(&previous_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("ModelVersion", previous_id))?
            }
        };

        let demoted = self.store.demote_production(&model_name).await?;
        log.push(format!("demoted {} production version(s)", demoted));
        self.store.promote_model_version(&target.id).await?;
        log.push(format!("promoted {} ({})", target.version, target.id));
        self.prediction.invalidate_cache();
        log.push("prediction cache invalidated".to_string());

        info!(model = %model_name, version = %target.version, "Model rolled back");
        Ok(RollbackReport {
            success: true,
            reason: None,
            restored_version: Some(target.version),
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::HEURISTIC_VERSION;
    use crate::models::ParameterCache;
    use crate::store::MemoryStore;
    use crate::types::feedback::{CampaignSnapshot, CreatorSnapshot};
    use chrono::Duration;
    use std::collections::HashMap;

    const MODEL: &str = "performance_predictor";

    fn pipeline(store: Arc<MemoryStore>) -> (RetrainingPipeline, Arc<PredictionModel>) {
        let prediction = Arc::new(PredictionModel::new(store.clone(), Arc::new(ParameterCache::new()), MODEL));
        let optimizer = Arc::new(WeightOptimizer::new(store.clone()));
        let pipeline = RetrainingPipeline::new(
            store,
            prediction.clone(),
            optimizer,
            RetrainingConfig::default(),
            OptimizeOptions::default(),
        );
        (pipeline, prediction)
    }

    /// Record whose actual engagement is exactly what the default weights predict
    fn fitted_record(i: usize) -> FeedbackRecord {
        let x = i as f64 / 30.0;
        let features = PredictionFeatures {
            engagement_signal: x,
            follower_tier: 0.5,
            success_ratio: 1.0 - x,
            category_match: 1.0,
            price_efficiency: 0.5,
            quality: 0.6,
            ..PredictionFeatures::default()
        };
        let actual = linear_forward(&weights_of(&ModelParameters::default()), &features.training_vector());
        FeedbackRecord {
            campaign_id: format!("k{}", i),
            creator_id: format!("c{}", i),
            predicted_engagement: None,
            predicted_roi: None,
            predicted_reach: None,
            actual_engagement: actual,
            actual_roi: 50.0,
            actual_reach: 1_000,
            engagement_error: None,
            roi_error: None,
            success: i % 2 == 0,
            model_version: None,
            features: features.to_map(),
            creator_snapshot: CreatorSnapshot::default(),
            campaign_snapshot: CampaignSnapshot::default(),
            completed_at: Utc::now() + Duration::seconds(i as i64),
        }
    }

    fn version(id: &str, version: &str, production: bool, previous: Option<&str>, age_days: i64) -> ModelVersion {
        ModelVersion {
            id: id.to_string(),
            model_name: MODEL.to_string(),
            version: version.to_string(),
            parameters: ModelParameters::default(),
            hyperparameters: Hyperparameters::default(),
            metrics: ModelMetrics::default(),
            is_production: production,
            previous_version: previous.map(str::to_string),
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(["v1.0"]), "v1.1");
        assert_eq!(next_version(["v1.9"]), "v2.0");
        assert_eq!(next_version(["v1.0", "v3.4", "v2.2"]), "v3.5");
        assert_eq!(next_version(Vec::<&str>::new()), FIRST_VERSION);
    }

    #[test]
    fn test_unparseable_versions_do_not_restart_numbering() {
        assert_eq!(next_version(["legacy", "v2.3", "v1.9"]), "v2.4");
        assert_eq!(next_version(["v2.3", "retrained-june"]), "v2.4");
        assert_eq!(next_version(["legacy"]), FIRST_VERSION);
    }

    #[test]
    fn test_improvement_tolerance_band() {
        assert!(is_improvement(1.04, Some(1.0), 1.05));
        assert!(is_improvement(0.8, Some(1.0), 1.05));
        assert!(!is_improvement(1.2, Some(1.0), 1.05));
        assert!(!is_improvement(1.05, Some(1.0), 1.05));
        assert!(is_improvement(99.0, None, 1.05));
    }

    #[test]
    fn test_training_reduces_error() {
        let target = [0.4, 0.05, 0.1, 0.3, 0.05, 0.1];
        let samples: Vec<Sample> = (0..40)
            .map(|i| {
                let t = i as f64 / 40.0;
                let x = [t, 1.0 - t, 0.5, (t * 3.0) % 1.0, 0.3, 0.7];
                (x, linear_forward(&target, &x))
            })
            .collect();
        let start = weights_of(&ModelParameters::default());
        let before = evaluate(&start, &samples).mae;
        let trained = train(start, &samples, 200, 0.01);
        let after = evaluate(&trained, &samples).mae;
        assert!(after < before);
        assert!(trained.iter().all(|w| (0.01..=0.5).contains(w)));
    }

    #[tokio::test]
    async fn test_not_needed_without_new_data() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..3 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, _) = pipeline(store);
        let report = pipeline.run(false).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.stage, PipelineStage::Check);
        assert!(report.reason.unwrap().starts_with("Retraining not needed"));
    }

    #[tokio::test]
    async fn test_first_training_deploys_v1() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..25 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, prediction) = pipeline(store.clone());
        assert_eq!(prediction.current_parameters().await.unwrap().version, HEURISTIC_VERSION);

        let report = pipeline.run(false).await.unwrap();
        assert!(report.success, "{:?}", report.log);
        assert_eq!(report.stage, PipelineStage::Done);
        assert_eq!(report.model_version.as_deref(), Some(FIRST_VERSION));
        assert!(report.validation.as_ref().unwrap().improved);
        assert!(report.weight_optimization.is_some());
        assert!(report.log.iter().any(|l| l.starts_with("[DEPLOY]")));

        let production = store.production_model(MODEL).await.unwrap().unwrap();
        assert_eq!(production.version, FIRST_VERSION);
        assert_eq!(production.hyperparameters.train_samples, 20);
        // Cache was invalidated by the deploy
        assert_eq!(prediction.current_parameters().await.unwrap().version, FIRST_VERSION);
    }

    #[tokio::test]
    async fn test_worse_model_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.insert_model_version(version("mv1", "v1.0", true, None, 2)).await.unwrap();
        for i in 0..25 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, _) = pipeline(store.clone());

        // Production already fits the data exactly, so nothing can beat it
        let report = pipeline.run(false).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.reason.as_deref(), Some("No improvement"));
        assert_eq!(report.stage, PipelineStage::Reject);
        assert!(!report.validation.unwrap().improved);

        let production = store.production_model(MODEL).await.unwrap().unwrap();
        assert_eq!(production.id, "mv1");
        let versions = store.list_model_versions(MODEL).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|v| v.version == "v1.1" && !v.is_production));
    }

    #[tokio::test]
    async fn test_rollback_to_previous_version() {
        let store = Arc::new(MemoryStore::new());
        store.insert_model_version(version("mv1", "v1.0", false, None, 10)).await.unwrap();
        store.insert_model_version(version("mv2", "v1.1", true, Some("mv1"), 5)).await.unwrap();
        let (pipeline, prediction) = pipeline(store.clone());
        assert_eq!(prediction.current_parameters().await.unwrap().version, "v1.1");

        let report = pipeline.rollback(None).await.unwrap();
        assert!(report.success);
        assert_eq!(report.restored_version.as_deref(), Some("v1.0"));
        assert_eq!(store.production_model(MODEL).await.unwrap().unwrap().id, "mv1");
        assert_eq!(prediction.current_parameters().await.unwrap().version, "v1.0");

        // v1.0 has no predecessor
        let report = pipeline.rollback(None).await.unwrap();
        assert!(!report.success);

        let report = pipeline.rollback(Some("mv2")).await.unwrap();
        assert!(report.success);
        assert!(pipeline.rollback(Some("missing")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_degraded_accuracy_triggers_retraining() {
        let store = Arc::new(MemoryStore::new());
        store.insert_model_version(version("mv1", "v1.0", true, None, 10)).await.unwrap();
        // Predicted double the actual engagement, all before v1.0 was trained
        for i in 0..25 {
            let mut record = fitted_record(i);
            record.predicted_engagement = Some(record.actual_engagement * 2.0);
            record.completed_at = Utc::now() - Duration::days(20) + Duration::seconds(i as i64);
            store.upsert_feedback(record).await.unwrap();
        }
        for i in 25..28 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, _) = pipeline(store.clone());

        let report = pipeline.run(false).await.unwrap();
        assert_ne!(report.stage, PipelineStage::Check, "{:?}", report.log);
        assert!(report.log.iter().any(|l| l.contains("accuracy degraded")), "{:?}", report.log);
        assert!(report.validation.is_some());
        assert_eq!(store.list_model_versions(MODEL).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_refused() {
        let store = Arc::new(MemoryStore::new());
        store.insert_model_version(version("mv1", "v1.0", false, None, 10)).await.unwrap();
        store.insert_model_version(version("mv2", "v1.1", true, Some("mv1"), 5)).await.unwrap();
        for i in 0..25 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, _) = pipeline(store.clone());

        let _held = pipeline.running.lock().await;
        let report = pipeline.run(true).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.reason.as_deref(), Some(REASON_ALREADY_RUNNING));
        assert!(report.validation.is_none());

        let rollback = pipeline.rollback(None).await.unwrap();
        assert!(!rollback.success);
        assert_eq!(rollback.reason.as_deref(), Some(REASON_ALREADY_RUNNING));

        assert_eq!(store.list_model_versions(MODEL).await.unwrap().len(), 2);
        assert_eq!(store.production_model(MODEL).await.unwrap().unwrap().id, "mv2");
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_production() {
        let store = Arc::new(MemoryStore::new());
        store.insert_model_version(version("mv1", "v1.0", true, None, 2)).await.unwrap();
        for i in 0..25 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, _) = pipeline(store.clone());

        store.fail_operation("insert_model_version");
        assert!(pipeline.run(true).await.is_err());
        store.clear_failures();

        assert_eq!(store.production_model(MODEL).await.unwrap().unwrap().id, "mv1");
        assert_eq!(store.list_model_versions(MODEL).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_promote_restores_previous_production() {
        let store = Arc::new(MemoryStore::new());
        store.insert_model_version(version("mv1", "v1.0", true, None, 2)).await.unwrap();
        for i in 0..25 {
            store.upsert_feedback(fitted_record(i)).await.unwrap();
        }
        let (pipeline, prediction) = pipeline(store.clone());

        store.fail_operation_times("promote_model_version", 1);
        assert!(pipeline.run(true).await.is_err());

        assert_eq!(store.production_model(MODEL).await.unwrap().unwrap().id, "mv1");
        let versions = store.list_model_versions(MODEL).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|v| v.version == "v1.1" && !v.is_production));
        assert_eq!(prediction.current_parameters().await.unwrap().version, "v1.0");
    }

    #[test]
    fn test_snapshot_features_fallback() {
        let mut record = fitted_record(3);
        record.features = HashMap::new();
        record.creator_snapshot.engagement_rate = 5.0;
        record.creator_snapshot.category = "tech".to_string();
        record.campaign_snapshot.category = "tech".to_string();
        let x = training_features(&record);
        assert_eq!(x[0], 0.5);
        assert_eq!(x[3], 1.0);
        assert_eq!(x[5], 0.5);
    }
}
