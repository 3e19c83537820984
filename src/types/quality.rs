//! Creator Quality Index records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six independently normalized CQI sub-scores, each in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    #[serde(default)]
    pub engagement_consistency: f64,
    #[serde(default)]
    pub growth_stability: f64,
    #[serde(default)]
    pub comment_authenticity: f64,
    #[serde(default)]
    pub posting_frequency: f64,
    #[serde(default)]
    pub niche_authority: f64,
    #[serde(default)]
    pub audience_retention: f64,
}

/// Current CQI for a creator (one live row per creator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIndex {
    pub creator_id: String,
    /// Composite score (0 - 100)
    pub score: f64,
    pub subscores: SubScores,
    /// Fraud risk consumed from the detector (0 - 1)
    pub fraud_risk_score: f64,
    /// Cold-start signal (0 - 1)
    pub confidence: f64,
    pub data_points: u32,
    pub computed_at: DateTime<Utc>,
}

/// Append-only history row used for trend derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub creator_id: String,
    pub score: f64,
    pub fraud_risk_score: f64,
    pub recorded_at: DateTime<Utc>,
}

impl From<&QualityIndex> for QualitySnapshot {
    fn from(index: &QualityIndex) -> Self {
        Self {
            creator_id: index.creator_id.clone(),
            score: index.score,
            fraud_risk_score: index.fraud_risk_score,
            recorded_at: index.computed_at,
        }
    }
}

/// Direction of a creator's CQI over recent snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTrend {
    Rising,
    Stable,
    Declining,
}
