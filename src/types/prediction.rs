//! Campaign performance predictions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Symmetric interval around a point estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub engagement: Interval,
    pub roi: Interval,
}

/// Forward-model output for one (campaign, creator) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Engagement rate in percent, clamped to [0.1, 20]
    pub predicted_engagement: f64,
    pub predicted_reach: u64,
    /// ROI in percent, clamped to [-50, 500]
    pub predicted_roi: f64,
    pub confidence_interval: ConfidenceInterval,
    /// Delivery risk (0.0 - 1.0)
    pub risk_score: f64,
    pub confidence: f64,
    pub model_version: String,
}

/// Persisted prediction; at most one live row per pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignPrediction {
    pub campaign_id: String,
    pub creator_id: String,
    pub prediction: Prediction,
    /// Feature values the prediction was computed from
    #[serde(default)]
    pub features: HashMap<String, f64>,
    pub predicted_at: DateTime<Utc>,
}
