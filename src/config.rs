//! Configuration management for the scoring engine

use crate::types::fraud::RecommendationThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main engine configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub quality: QualityConfig,
    pub fraud: FraudConfig,
    pub prediction: PredictionConfig,
    pub optimizer: OptimizerConfig,
    pub retraining: RetrainingConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimensionality for stored embeddings
    pub dimensions: usize,
    /// Base URL of an OpenAI-compatible embedding API; local fallback only when unset
    pub provider_url: Option<String>,
    /// Provider model name
    pub model: String,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
    /// Provider request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            provider_url: None,
            model: "text-embedding-3-small".to_string(),
            api_key_env: "EMBEDDING_API_KEY".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Quality index configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Data points at which confidence reaches 1.0
    pub full_confidence_points: u32,
    /// Snapshots considered for trend derivation
    pub trend_window: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            full_confidence_points: 20,
            trend_window: 5,
        }
    }
}

/// Fraud detection configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FraudConfig {
    pub thresholds: RecommendationThresholds,
}

/// Prediction model configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Model name used for versioning
    pub model_name: String,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            model_name: "performance_predictor".to_string(),
        }
    }
}

/// Weight optimizer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub min_samples: usize,
    pub learning_rate: f64,
    pub iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_samples: 15,
            learning_rate: 0.05,
            iterations: 50,
        }
    }
}

/// Retraining pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrainingConfig {
    /// New feedback records needed before retraining
    pub min_samples: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Accuracy below which retraining is forced by degradation
    pub accuracy_floor: f64,
    /// New MAE must be below current MAE times this factor
    pub improvement_tolerance: f64,
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            epochs: 100,
            learning_rate: 0.001,
            accuracy_floor: 0.65,
            improvement_tolerance: 1.05,
        }
    }
}

/// Batch job scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Entities per batch page
    pub page_size: usize,
    pub weekly_interval_secs: u64,
    pub monthly_interval_secs: u64,
    /// Metrics summary interval
    pub report_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            weekly_interval_secs: 7 * 24 * 3600,
            monthly_interval_secs: 30 * 24 * 3600,
            report_interval_secs: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Record store bootstrap configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON seed file loaded into the in-memory store
    pub seed_path: Option<String>,
}

impl EngineConfig {
    /// Load configuration from the default file, if present, plus environment
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/engine.toml")
    }

    /// Load configuration from a specific path layered with `SCORING__*` env vars
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("SCORING").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.embedding.dimensions, 768);
        assert!(config.embedding.provider_url.is_none());
        assert_eq!(config.optimizer.min_samples, 15);
        assert_eq!(config.optimizer.iterations, 50);
        assert_eq!(config.retraining.accuracy_floor, 0.65);
        assert_eq!(config.retraining.improvement_tolerance, 1.05);
        assert_eq!(config.prediction.model_name, "performance_predictor");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.scheduler.page_size, 50);
        assert_eq!(config.fraud.thresholds.flag_for_review, 0.7);
    }
}
