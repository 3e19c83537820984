//! Outcome feedback: predicted vs actual campaign results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::campaign::Campaign;
use crate::types::creator::Creator;

/// Actual results reported when a campaign completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignOutcome {
    pub campaign_id: String,
    pub creator_id: String,
    /// Engagement rate in percent
    pub actual_engagement: f64,
    /// ROI in percent
    pub actual_roi: f64,
    #[serde(default)]
    pub actual_reach: u64,
    /// Explicit success flag; derived from ROI when absent
    #[serde(default)]
    pub success: Option<bool>,
}

/// Creator metrics frozen at completion time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatorSnapshot {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub engagement_rate: f64,
    #[serde(default)]
    pub reliability_score: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub completion_rate: f64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub cqi_score: Option<f64>,
}

impl CreatorSnapshot {
    pub fn capture(creator: &Creator, cqi_score: Option<f64>) -> Self {
        Self {
            category: creator.category.clone(),
            follower_count: creator.follower_count,
            engagement_rate: creator.engagement_rate,
            reliability_score: creator.reliability_score,
            rating: creator.rating,
            completion_rate: creator.completion_rate,
            location: creator.location.clone(),
            cqi_score,
        }
    }
}

/// Campaign targeting frozen at completion time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub target_locations: Vec<String>,
    #[serde(default)]
    pub min_followers: Option<u64>,
    #[serde(default)]
    pub max_followers: Option<u64>,
}

impl From<&Campaign> for CampaignSnapshot {
    fn from(campaign: &Campaign) -> Self {
        Self {
            category: campaign.category.clone(),
            budget: campaign.budget,
            target_locations: campaign.target_locations.clone(),
            min_followers: campaign.min_followers,
            max_followers: campaign.max_followers,
        }
    }
}

/// Ground-truth record for one (campaign, creator) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub campaign_id: String,
    pub creator_id: String,

    pub predicted_engagement: Option<f64>,
    pub predicted_roi: Option<f64>,
    pub predicted_reach: Option<u64>,

    pub actual_engagement: f64,
    pub actual_roi: f64,
    #[serde(default)]
    pub actual_reach: u64,

    /// |predicted - actual| / max(eps, |actual|)
    pub engagement_error: Option<f64>,
    pub roi_error: Option<f64>,

    pub success: bool,

    /// Model version that produced the prediction
    pub model_version: Option<String>,

    /// Prediction features, when a prediction existed
    #[serde(default)]
    pub features: HashMap<String, f64>,

    #[serde(default)]
    pub creator_snapshot: CreatorSnapshot,
    #[serde(default)]
    pub campaign_snapshot: CampaignSnapshot,

    pub completed_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Whether this record can be scored against a prediction
    pub fn has_prediction(&self) -> bool {
        self.predicted_engagement.is_some()
    }
}

/// Filter for feedback queries
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    /// Campaign category
    pub category: Option<String>,
    pub model_version: Option<String>,
    /// Only records completed strictly after this time
    pub since: Option<DateTime<Utc>>,
}

impl FeedbackFilter {
    pub fn matches(&self, record: &FeedbackRecord) -> bool {
        if let Some(category) = &self.category {
            if &record.campaign_snapshot.category != category {
                return false;
            }
        }
        if let Some(version) = &self.model_version {
            if record.model_version.as_ref() != Some(version) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.completed_at <= since {
                return false;
            }
        }
        true
    }
}
