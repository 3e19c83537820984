//! Versioned prediction-model snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::params::ModelParameters;

/// Held-out evaluation metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default)]
    pub mae: f64,
    #[serde(default)]
    pub rmse: f64,
    #[serde(default)]
    pub r2: f64,
    #[serde(default)]
    pub validation_samples: usize,
}

/// Training hyperparameters recorded alongside a version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    #[serde(default)]
    pub epochs: usize,
    #[serde(default)]
    pub learning_rate: f64,
    #[serde(default)]
    pub train_samples: usize,
}

/// One trained model; at most one production row per model name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: String,
    pub model_name: String,
    /// `vMAJOR.MINOR`
    pub version: String,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    #[serde(default)]
    pub metrics: ModelMetrics,
    #[serde(default)]
    pub is_production: bool,
    /// Id of the production version this one replaced
    #[serde(default)]
    pub previous_version: Option<String>,
    pub created_at: DateTime<Utc>,
}
