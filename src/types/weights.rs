//! Scoring weight configs and their optimization audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature name -> weight; always sums to 1.0
pub type WeightMap = BTreeMap<String, f64>;

/// Name of the global weight config
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Config name for a weight scope
pub fn config_name(category: Option<&str>) -> String {
    match category {
        Some(category) => format!("{}_optimized", category),
        None => DEFAULT_CONFIG_NAME.to_string(),
    }
}

/// Named weight vector with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeightConfig {
    /// `default` or `<category>_optimized`
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub weights: WeightMap,
    #[serde(default)]
    pub campaigns_used: usize,
    #[serde(default)]
    pub avg_success_rate: f64,
    /// Human-readable optimization log lines
    #[serde(default)]
    pub optimization_log: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Audit record of one optimization pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightOptimizationRun {
    pub id: String,
    pub config_name: String,
    pub previous_weights: WeightMap,
    pub new_weights: WeightMap,
    pub sample_count: usize,
    /// Objective improvement in percent
    pub improvement: f64,
    pub applied: bool,
    #[serde(default)]
    pub rolled_back: bool,
    pub created_at: DateTime<Utc>,
}
