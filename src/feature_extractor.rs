//! Feature extraction for the performance prediction model.
//!
//! Features are normalized to [0, 1] so the same values can drive both the
//! live heuristic forward model and the simplified linear model used during
//! retraining.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Campaign, Creator, QualityIndex};

/// Features the retraining forward model learns weights for, in order
pub const TRAINING_FEATURES: [&str; 6] = [
    "engagement_signal",
    "follower_tier",
    "success_ratio",
    "category_match",
    "price_efficiency",
    "quality",
];

/// Cost per follower treated as a fair price
const REFERENCE_COST_PER_FOLLOWER: f64 = 0.01;

/// Categories considered adjacent for matching purposes
const RELATED_CATEGORIES: &[(&str, &str)] = &[
    ("fashion", "beauty"),
    ("fashion", "lifestyle"),
    ("beauty", "lifestyle"),
    ("fitness", "health"),
    ("fitness", "food"),
    ("health", "food"),
    ("food", "travel"),
    ("travel", "lifestyle"),
    ("parenting", "lifestyle"),
    ("tech", "gaming"),
    ("business", "tech"),
    ("business", "finance"),
    ("gaming", "entertainment"),
    ("music", "entertainment"),
];

/// Category match: exact 1.0, adjacent 0.5, otherwise 0.1
pub fn category_match(creator_category: &str, campaign_category: &str) -> f64 {
    let a = creator_category.trim().to_lowercase();
    let b = campaign_category.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.1;
    }
    if a == b {
        return 1.0;
    }
    let related = RELATED_CATEGORIES
        .iter()
        .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a));
    if related {
        0.5
    } else {
        0.1
    }
}

/// Log-scaled follower tier: 1 follower -> 0.0, 10M followers -> 1.0
pub fn follower_tier_feature(followers: u64) -> f64 {
    ((followers.max(1) as f64).log10() / 7.0).clamp(0.0, 1.0)
}

/// Cheaper reach scores higher; a fair price scores 0.5
pub fn price_efficiency(budget: f64, followers: u64) -> f64 {
    if budget <= 0.0 {
        return 0.5;
    }
    let cost_per_follower = budget / followers.max(1) as f64;
    1.0 / (1.0 + cost_per_follower / REFERENCE_COST_PER_FOLLOWER)
}

/// Model input for one (creator, campaign) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeatures {
    pub engagement_signal: f64,
    pub follower_tier: f64,
    pub success_ratio: f64,
    pub category_match: f64,
    pub price_efficiency: f64,
    pub quality: f64,
    pub quality_confidence: f64,
    pub semantic_similarity: f64,
    pub fraud_risk: f64,
}

impl Default for PredictionFeatures {
    fn default() -> Self {
        Self {
            engagement_signal: 0.0,
            follower_tier: 0.0,
            success_ratio: 0.5,
            category_match: 0.1,
            price_efficiency: 0.5,
            quality: 0.5,
            quality_confidence: 0.0,
            semantic_similarity: 0.0,
            fraud_risk: 0.0,
        }
    }
}

impl PredictionFeatures {
    /// Named feature values as persisted alongside predictions
    pub fn to_map(&self) -> HashMap<String, f64> {
        [
            ("engagement_signal", self.engagement_signal),
            ("follower_tier", self.follower_tier),
            ("success_ratio", self.success_ratio),
            ("category_match", self.category_match),
            ("price_efficiency", self.price_efficiency),
            ("quality", self.quality),
            ("quality_confidence", self.quality_confidence),
            ("semantic_similarity", self.semantic_similarity),
            ("fraud_risk", self.fraud_risk),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Rebuild from a persisted map; missing keys take their defaults
    pub fn from_map(map: &HashMap<String, f64>) -> Self {
        let d = Self::default();
        let get = |key: &str, default: f64| map.get(key).copied().unwrap_or(default);
        Self {
            engagement_signal: get("engagement_signal", d.engagement_signal),
            follower_tier: get("follower_tier", d.follower_tier),
            success_ratio: get("success_ratio", d.success_ratio),
            category_match: get("category_match", d.category_match),
            price_efficiency: get("price_efficiency", d.price_efficiency),
            quality: get("quality", d.quality),
            quality_confidence: get("quality_confidence", d.quality_confidence),
            semantic_similarity: get("semantic_similarity", d.semantic_similarity),
            fraud_risk: get("fraud_risk", d.fraud_risk),
        }
    }

    /// Values for [`TRAINING_FEATURES`], in order
    pub fn training_vector(&self) -> [f64; 6] {
        [
            self.engagement_signal,
            self.follower_tier,
            self.success_ratio,
            self.category_match,
            self.price_efficiency,
            self.quality,
        ]
    }
}

/// Feature extractor that turns store records into model input features
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features for a pair; quality and similarity are optional inputs
    pub fn extract(
        &self,
        creator: &Creator,
        campaign: &Campaign,
        quality: Option<&QualityIndex>,
        similarity: Option<f64>,
    ) -> PredictionFeatures {
        PredictionFeatures {
            engagement_signal: (creator.engagement_rate / 10.0).clamp(0.0, 1.0),
            follower_tier: follower_tier_feature(creator.follower_count),
            success_ratio: creator.success_ratio(),
            category_match: category_match(&creator.category, &campaign.category),
            price_efficiency: price_efficiency(campaign.budget, creator.follower_count),
            quality: quality.map(|q| q.score / 100.0).unwrap_or(0.5).clamp(0.0, 1.0),
            quality_confidence: quality.map(|q| q.confidence).unwrap_or(0.0),
            semantic_similarity: similarity.unwrap_or(0.0).clamp(0.0, 1.0),
            fraud_risk: quality.map(|q| q.fraud_risk_score).unwrap_or(0.0),
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_match() {
        assert_eq!(category_match("Fashion", "fashion"), 1.0);
        assert_eq!(category_match("beauty", "fashion"), 0.5);
        assert_eq!(category_match("gaming", "tech"), 0.5);
        assert_eq!(category_match("gaming", "food"), 0.1);
        assert_eq!(category_match("", "food"), 0.1);
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let creator = Creator::new("c1", "tech", 100_000, 2.0).with_track_record(3, 4, 4.0, 80.0);
        let campaign = Campaign::new("k1", "gaming", 1_000.0);

        let features = extractor.extract(&creator, &campaign, None, Some(0.4));

        assert!((features.follower_tier - 5.0 / 7.0).abs() < 1e-9);
        assert_eq!(features.success_ratio, 0.75);
        assert_eq!(features.category_match, 0.5);
        // 1000 / 100k = 0.01 per follower -> fair price
        assert!((features.price_efficiency - 0.5).abs() < 1e-9);
        assert_eq!(features.quality, 0.5);
        assert_eq!(features.semantic_similarity, 0.4);
    }

    #[test]
    fn test_from_map_defaults_missing_keys() {
        let mut map = HashMap::new();
        map.insert("category_match".to_string(), 1.0);
        map.insert("some_future_feature".to_string(), 3.0);

        let features = PredictionFeatures::from_map(&map);
        assert_eq!(features.category_match, 1.0);
        assert_eq!(features.success_ratio, 0.5);
        assert_eq!(features.quality, 0.5);
    }
}
