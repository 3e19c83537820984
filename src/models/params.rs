//! Prediction model parameters.
//!
//! Persisted as an opaque JSON blob on each model version. Every field
//! defaults so blobs written before a key existed still deserialize.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version tag for the built-in heuristic parameters
pub const HEURISTIC_VERSION: &str = "heuristic";

/// Lower and upper bound for learned feature weights
pub const FEATURE_WEIGHT_BOUNDS: (f64, f64) = (0.01, 0.5);

/// Expected outcome for an average campaign in a category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryBenchmark {
    /// Engagement rate in percent
    pub engagement: f64,
    /// ROI in percent
    pub roi: f64,
}

impl Default for CategoryBenchmark {
    fn default() -> Self {
        Self {
            engagement: 2.5,
            roi: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    pub feature_weights: BTreeMap<String, f64>,
    pub category_benchmarks: BTreeMap<String, CategoryBenchmark>,
    pub format_multipliers: BTreeMap<String, f64>,
    pub default_benchmark: CategoryBenchmark,
}

fn default_feature_weight(name: &str) -> f64 {
    match name {
        "engagement_signal" => 0.35,
        "follower_tier" => 0.10,
        "success_ratio" => 0.15,
        "category_match" => 0.20,
        "price_efficiency" => 0.10,
        "quality" => 0.20,
        _ => 0.10,
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        let feature_weights = crate::feature_extractor::TRAINING_FEATURES
            .iter()
            .map(|name| (name.to_string(), default_feature_weight(name)))
            .collect();

        let category_benchmarks = [
            ("fashion", 3.5, 120.0),
            ("beauty", 3.8, 130.0),
            ("tech", 2.2, 150.0),
            ("gaming", 4.0, 110.0),
            ("fitness", 3.2, 125.0),
            ("food", 3.6, 115.0),
            ("travel", 3.0, 100.0),
            ("lifestyle", 3.0, 105.0),
        ]
        .into_iter()
        .map(|(name, engagement, roi)| (name.to_string(), CategoryBenchmark { engagement, roi }))
        .collect();

        let format_multipliers = [
            ("post", 1.0),
            ("carousel", 1.15),
            ("reel", 1.35),
            ("video", 1.2),
            ("story", 0.8),
            ("live", 1.1),
        ]
        .into_iter()
        .map(|(name, m)| (name.to_string(), m))
        .collect();

        Self {
            feature_weights,
            category_benchmarks,
            format_multipliers,
            default_benchmark: CategoryBenchmark::default(),
        }
    }
}

impl ModelParameters {
    /// Weight for a feature; unknown keys fall back to the heuristic default
    pub fn weight(&self, name: &str) -> f64 {
        self.feature_weights
            .get(name)
            .copied()
            .unwrap_or_else(|| default_feature_weight(name))
    }

    pub fn set_weight(&mut self, name: &str, value: f64) {
        let (lo, hi) = FEATURE_WEIGHT_BOUNDS;
        self.feature_weights.insert(name.to_string(), value.clamp(lo, hi));
    }

    pub fn benchmark(&self, category: &str) -> CategoryBenchmark {
        self.category_benchmarks
            .get(&category.to_lowercase())
            .copied()
            .unwrap_or(self.default_benchmark)
    }

    pub fn format_multiplier(&self, format: &str) -> f64 {
        self.format_multipliers
            .get(&format.to_lowercase())
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_blob_deserializes() {
        let params: ModelParameters =
            serde_json::from_str(r#"{"feature_weights":{"quality":0.3}}"#).unwrap();

        assert_eq!(params.weight("quality"), 0.3);
        assert_eq!(params.weight("category_match"), 0.20);
        assert_eq!(params.format_multiplier("reel"), 1.35);
        assert_eq!(params.benchmark("unknown"), CategoryBenchmark::default());
    }

    #[test]
    fn test_set_weight_clamps() {
        let mut params = ModelParameters::default();
        params.set_weight("quality", 0.9);
        params.set_weight("follower_tier", -1.0);
        assert_eq!(params.weight("quality"), 0.5);
        assert_eq!(params.weight("follower_tier"), 0.01);
    }
}
