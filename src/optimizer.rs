//! Dynamic match-weight optimization.
//!
//! Tunes the eight match-feature weights against completed campaign outcomes
//! with a greedy coordinate descent. Every pass is audited as a
//! [`WeightOptimizationRun`] so it can be rolled back to the exact previous
//! weights.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audience::{follower_range_fit, location_fit};
use crate::config::OptimizerConfig;
use crate::error::{EngineError, EngineResult};
use crate::feature_extractor::category_match;
use crate::store::Store;
use crate::types::feedback::{CampaignSnapshot, CreatorSnapshot};
use crate::types::weights::{config_name, WeightMap, DEFAULT_CONFIG_NAME};
use crate::types::{FeedbackFilter, FeedbackRecord, FollowerTier, ScoringWeightConfig, WeightOptimizationRun};

pub const MATCH_FEATURES: [&str; 8] = [
    "category_match",
    "engagement",
    "quality",
    "reliability",
    "rating",
    "completion",
    "follower_fit",
    "location",
];

/// Per-weight bounds enforced after every perturbation
pub const WEIGHT_BOUNDS: (f64, f64) = (0.02, 0.25);

/// Match score at or above which a campaign is predicted to succeed
pub const SUCCESS_THRESHOLD: f64 = 0.5;

pub const REASON_INSUFFICIENT_DATA: &str = "insufficient_data";
pub const REASON_ALREADY_RUNNING: &str = "already_running";

type FeatureVector = [f64; 8];

/// Optimizable weights over the match features.
///
/// Not to be confused with [`crate::models::AiWeights`], which blends the
/// composite match signals and is never tuned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub category_match: f64,
    pub engagement: f64,
    pub quality: f64,
    pub reliability: f64,
    pub rating: f64,
    pub completion: f64,
    pub follower_fit: f64,
    pub location: f64,
}

pub const DEFAULT_WEIGHTS: MatchWeights = MatchWeights {
    category_match: 0.20,
    engagement: 0.15,
    quality: 0.15,
    reliability: 0.12,
    rating: 0.10,
    completion: 0.10,
    follower_fit: 0.10,
    location: 0.08,
};

impl MatchWeights {
    fn to_array(self) -> FeatureVector {
        [
            self.category_match,
            self.engagement,
            self.quality,
            self.reliability,
            self.rating,
            self.completion,
            self.follower_fit,
            self.location,
        ]
    }

    fn from_array(w: FeatureVector) -> Self {
        Self {
            category_match: w[0],
            engagement: w[1],
            quality: w[2],
            reliability: w[3],
            rating: w[4],
            completion: w[5],
            follower_fit: w[6],
            location: w[7],
        }
    }

    pub fn to_map(&self) -> WeightMap {
        MATCH_FEATURES
            .iter()
            .zip(self.to_array())
            .map(|(name, w)| (name.to_string(), w))
            .collect()
    }

    /// Read a persisted weight map; unknown keys are ignored and missing
    /// keys take their default before renormalization
    pub fn from_map(map: &WeightMap) -> Self {
        let defaults = DEFAULT_WEIGHTS.to_array();
        let mut w = [0.0; 8];
        for (i, name) in MATCH_FEATURES.iter().enumerate() {
            w[i] = map.get(*name).copied().unwrap_or(defaults[i]);
        }
        normalize_weights(&mut w);
        Self::from_array(w)
    }

    pub fn sum(&self) -> f64 {
        self.to_array().iter().sum()
    }

    /// Weighted match score in [0, 1] for features in [0, 1]
    pub fn score(&self, features: &FeatureVector) -> f64 {
        self.to_array().iter().zip(features).map(|(w, x)| w * x).sum()
    }
}

impl Default for MatchWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

/// Project weights onto the bounded simplex: each weight within
/// [`WEIGHT_BOUNDS`] and the total exactly 1.
///
/// The remainder after clamping is spread over the weights still free to
/// move, in proportion to their size, until nothing is left to spread.
pub fn normalize_weights(weights: &mut [f64]) {
    let (min, max) = WEIGHT_BOUNDS;
    if weights.is_empty() {
        return;
    }
    for w in weights.iter_mut() {
        *w = if w.is_finite() { w.clamp(min, max) } else { min };
    }

    for _ in 0..=weights.len() {
        let diff = 1.0 - weights.iter().sum::<f64>();
        if diff.abs() < 1e-12 {
            break;
        }
        let free: Vec<usize> = (0..weights.len())
            .filter(|&i| if diff > 0.0 { weights[i] < max } else { weights[i] > min })
            .collect();
        if free.is_empty() {
            break;
        }
        let free_sum: f64 = free.iter().map(|&i| weights[i]).sum();
        for &i in &free {
            let share = if free_sum > 0.0 {
                weights[i] / free_sum
            } else {
                1.0 / free.len() as f64
            };
            weights[i] = (weights[i] + diff * share).clamp(min, max);
        }
    }
}

/// Match features for a completed campaign, from the snapshots frozen on
/// its feedback record
pub fn match_features(record: &FeedbackRecord) -> FeatureVector {
    snapshot_features(&record.creator_snapshot, &record.campaign_snapshot)
}

/// Match features for a creator and campaign as they stand in the snapshots
pub fn snapshot_features(creator: &CreatorSnapshot, campaign: &CampaignSnapshot) -> FeatureVector {
    let typical = FollowerTier::from_followers(creator.follower_count)
        .benchmark()
        .typical;
    let engagement = if typical > 0.0 {
        (creator.engagement_rate / typical / 2.0).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let follower_fit = follower_range_fit(creator.follower_count, campaign.min_followers, campaign.max_followers);
    let location = location_fit(creator.location.as_deref(), &campaign.target_locations);

    [
        category_match(&creator.category, &campaign.category),
        engagement,
        creator.cqi_score.map(|s| s / 100.0).unwrap_or(0.5).clamp(0.0, 1.0),
        (creator.reliability_score / 100.0).clamp(0.0, 1.0),
        (creator.rating / 5.0).clamp(0.0, 1.0),
        (creator.completion_rate / 100.0).clamp(0.0, 1.0),
        follower_fit.clamp(0.0, 1.0),
        location,
    ]
}

/// Fraction of samples whose predicted success agrees with the outcome
pub fn objective(weights: &MatchWeights, samples: &[(FeatureVector, bool)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let agree = samples
        .iter()
        .filter(|(features, success)| (weights.score(features) >= SUCCESS_THRESHOLD) == *success)
        .count();
    agree as f64 / samples.len() as f64
}

#[derive(Debug, Clone)]
pub struct DescentResult {
    pub weights: MatchWeights,
    pub initial_score: f64,
    pub best_score: f64,
    /// Best objective after each pass, starting with the initial score
    pub score_history: Vec<f64>,
    pub accepted_moves: usize,
}

/// Greedy coordinate descent over the weight dimensions.
///
/// Only strictly improving moves are accepted, so the objective never
/// decreases. A pass with no accepted move ends the search.
pub fn coordinate_descent(
    start: MatchWeights,
    samples: &[(FeatureVector, bool)],
    learning_rate: f64,
    iterations: usize,
) -> DescentResult {
    let mut best = start.to_array();
    normalize_weights(&mut best);
    let initial_score = objective(&MatchWeights::from_array(best), samples);
    let mut best_score = initial_score;
    let mut score_history = vec![initial_score];
    let mut accepted_moves = 0;

    for pass in 0..iterations {
        let mut improved = false;
        for dim in 0..best.len() {
            let mut winner: Option<(FeatureVector, f64)> = None;
            for delta in [learning_rate, -learning_rate] {
                let mut candidate = best;
                candidate[dim] += delta;
                normalize_weights(&mut candidate);
                let score = objective(&MatchWeights::from_array(candidate), samples);
                let threshold = winner.map(|(_, s)| s).unwrap_or(best_score);
                if score > threshold {
                    winner = Some((candidate, score));
                }
            }
            if let Some((candidate, score)) = winner {
                best = candidate;
                best_score = score;
                accepted_moves += 1;
                improved = true;
            }
        }
        score_history.push(best_score);
        debug!(pass, best_score, "Coordinate descent pass complete");
        if !improved {
            break;
        }
    }

    DescentResult {
        weights: MatchWeights::from_array(best),
        initial_score,
        best_score,
        score_history,
        accepted_moves,
    }
}

#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    /// Category scope; `None` tunes the global config
    pub category: Option<String>,
    pub min_samples: usize,
    pub learning_rate: f64,
    pub iterations: usize,
}

impl OptimizeOptions {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self {
            category: None,
            min_samples: config.min_samples,
            learning_rate: config.learning_rate,
            iterations: config.iterations,
        }
    }

    pub fn for_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    /// False when the descent did not run
    pub optimized: bool,
    pub reason: Option<String>,
    pub config_name: String,
    pub sample_count: usize,
    pub previous_weights: WeightMap,
    pub new_weights: WeightMap,
    /// Objective gain in percentage points
    pub improvement: f64,
    /// Whether the new weights were persisted
    pub applied: bool,
    pub run_id: Option<String>,
}

impl OptimizationOutcome {
    fn skipped(config_name: String, reason: &str, sample_count: usize, weights: WeightMap) -> Self {
        Self {
            optimized: false,
            reason: Some(reason.to_string()),
            config_name,
            sample_count,
            previous_weights: weights.clone(),
            new_weights: weights,
            improvement: 0.0,
            applied: false,
            run_id: None,
        }
    }
}

/// Weight optimization service; one run at a time
pub struct WeightOptimizer {
    store: Arc<dyn Store>,
    running: Mutex<()>,
}

impl WeightOptimizer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            running: Mutex::new(()),
        }
    }

    /// Weights in effect for a scope: the scoped config, then the global
    /// config, then the defaults
    pub async fn current_weights(&self, category: Option<&str>) -> EngineResult<MatchWeights> {
        let name = config_name(category);
        if let Some(config) = self.store.get_weight_config(&name).await? {
            return Ok(MatchWeights::from_map(&config.weights));
        }
        if name != DEFAULT_CONFIG_NAME {
            if let Some(config) = self.store.get_weight_config(DEFAULT_CONFIG_NAME).await? {
                return Ok(MatchWeights::from_map(&config.weights));
            }
        }
        Ok(DEFAULT_WEIGHTS)
    }

    pub async fn optimize_weights(&self, options: OptimizeOptions) -> EngineResult<OptimizationOutcome> {
        let name = config_name(options.category.as_deref());
        let Ok(_guard) = self.running.try_lock() else {
            warn!(config = %name, "Weight optimization already running, skipping");
            return Ok(OptimizationOutcome::skipped(name, REASON_ALREADY_RUNNING, 0, WeightMap::new()));
        };

        let filter = FeedbackFilter {
            category: options.category.clone(),
            ..FeedbackFilter::default()
        };
        let records = self.store.list_feedback(&filter).await?;
        let previous = self.current_weights(options.category.as_deref()).await?;

        if records.len() < options.min_samples {
            info!(
                config = %name,
                samples = records.len(),
                min_samples = options.min_samples,
                "Not enough completed campaigns to optimize weights"
            );
            return Ok(OptimizationOutcome::skipped(
                name,
                REASON_INSUFFICIENT_DATA,
                records.len(),
                previous.to_map(),
            ));
        }

        let samples: Vec<(FeatureVector, bool)> = records.iter().map(|r| (match_features(r), r.success)).collect();
        let result = coordinate_descent(previous, &samples, options.learning_rate, options.iterations);
        let improvement = (result.best_score - result.initial_score) * 100.0;
        let applied = improvement > 0.0;

        let previous_weights = previous.to_map();
        let new_weights = if applied {
            result.weights.to_map()
        } else {
            previous_weights.clone()
        };

        if applied {
            let successes = records.iter().filter(|r| r.success).count();
            let mut optimization_log = match self.store.get_weight_config(&name).await? {
                Some(existing) => existing.optimization_log,
                None => Vec::new(),
            };
            optimization_log.push(format!(
                "{}: accuracy {:.1}% -> {:.1}% over {} campaigns ({} moves)",
                Utc::now().format("%Y-%m-%d %H:%M:%S"),
                result.initial_score * 100.0,
                result.best_score * 100.0,
                records.len(),
                result.accepted_moves
            ));
            self.store
                .upsert_weight_config(ScoringWeightConfig {
                    name: name.clone(),
                    category: options.category.clone(),
                    weights: new_weights.clone(),
                    campaigns_used: records.len(),
                    avg_success_rate: successes as f64 / records.len() as f64,
                    optimization_log,
                    is_active: true,
                    updated_at: Utc::now(),
                })
                .await?;
        }

        let run = WeightOptimizationRun {
            id: uuid::Uuid::new_v4().to_string(),
            config_name: name.clone(),
            previous_weights: previous_weights.clone(),
            new_weights: new_weights.clone(),
            sample_count: records.len(),
            improvement,
            applied,
            rolled_back: false,
            created_at: Utc::now(),
        };
        let run_id = run.id.clone();
        self.store.insert_optimization_run(run).await?;

        info!(
            config = %name,
            samples = records.len(),
            initial_accuracy = result.initial_score,
            best_accuracy = result.best_score,
            improvement,
            applied,
            run_id = %run_id,
            "Weight optimization complete"
        );

        Ok(OptimizationOutcome {
            optimized: true,
            reason: None,
            config_name: name,
            sample_count: records.len(),
            previous_weights,
            new_weights,
            improvement,
            applied,
            run_id: Some(run_id),
        })
    }

    /// Restore the weights captured before an optimization run
    pub async fn rollback(&self, run_id: &str) -> EngineResult<ScoringWeightConfig> {
        let mut run = self
            .store
            .get_optimization_run(run_id)
            .await?
            .ok_or_else(|| EngineError::not_found("WeightOptimizationRun", run_id))?;
        if run.rolled_back {
            return Err(EngineError::Conflict(format!(
                "optimization run {} already rolled back",
                run_id
            )));
        }

        let mut config = match self.store.get_weight_config(&run.config_name).await? {
            Some(config) => config,
            None => ScoringWeightConfig {
                name: run.config_name.clone(),
                category: run.config_name.strip_suffix("_optimized").map(str::to_string),
                weights: WeightMap::new(),
                campaigns_used: 0,
                avg_success_rate: 0.0,
                optimization_log: Vec::new(),
                is_active: true,
                updated_at: Utc::now(),
            },
        };
        config.weights = run.previous_weights.clone();
        config.optimization_log.push(format!(
            "{}: rolled back run {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            run_id
        ));
        config.updated_at = Utc::now();
        self.store.upsert_weight_config(config.clone()).await?;

        run.rolled_back = true;
        self.store.update_optimization_run(run).await?;

        info!(config = %config.name, run_id = %run_id, "Weight optimization rolled back");
        Ok(config)
    }
}
