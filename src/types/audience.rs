//! Derived audience profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::creator::FollowerTier;

/// Audience summary recomputed weekly per creator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceProfile {
    pub creator_id: String,
    #[serde(default)]
    pub primary_location: Option<String>,
    pub tier: FollowerTier,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub category: String,
    /// Followers estimated to actually see and engage with content
    pub active_audience_estimate: u64,
    /// Audience quality factor (0.0 - 1.0)
    pub quality_factor: f64,
    pub computed_at: DateTime<Utc>,
}
