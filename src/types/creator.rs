//! Creator records and follower-tier benchmarks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creator profile as read from the record store.
///
/// Everything here is owned by external profile edits except `ai_score`,
/// which the quality engine writes back after each CQI computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    /// Unique creator identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Content category (e.g. "fashion", "tech")
    #[serde(default)]
    pub category: String,

    /// Current follower count
    #[serde(default)]
    pub follower_count: u64,

    /// Current engagement rate in percent (2.5 means 2.5%)
    #[serde(default)]
    pub engagement_rate: f64,

    /// Platform reliability score (0 - 100)
    #[serde(default)]
    pub reliability_score: f64,

    /// Average brand rating (0 - 5)
    #[serde(default)]
    pub rating: f64,

    /// Campaign completion percentage (0 - 100)
    #[serde(default)]
    pub completion_rate: f64,

    /// Home location
    #[serde(default)]
    pub location: Option<String>,

    /// Free-text bio used for semantic matching
    #[serde(default)]
    pub bio: Option<String>,

    /// Account creation date on the social platform
    #[serde(default)]
    pub account_created_at: Option<DateTime<Utc>>,

    /// Campaigns finished successfully
    #[serde(default)]
    pub completed_campaigns: u32,

    /// Campaigns accepted in total
    #[serde(default)]
    pub total_campaigns: u32,

    /// Periodic metric observations, oldest first
    #[serde(default)]
    pub metrics_history: Vec<MetricSnapshot>,

    /// Denormalized CQI score written by the engine
    #[serde(default)]
    pub ai_score: Option<f64>,
}

impl Creator {
    /// Create a creator with the fields detection and scoring need most
    pub fn new(id: impl Into<String>, category: impl Into<String>, follower_count: u64, engagement_rate: f64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            category: category.into(),
            follower_count,
            engagement_rate,
            reliability_score: 0.0,
            rating: 0.0,
            completion_rate: 0.0,
            location: None,
            bio: None,
            account_created_at: None,
            completed_campaigns: 0,
            total_campaigns: 0,
            metrics_history: Vec::new(),
            ai_score: None,
        }
    }

    /// Attach a metric history (oldest first)
    pub fn with_history(mut self, history: Vec<MetricSnapshot>) -> Self {
        self.metrics_history = history;
        self
    }

    /// Attach track-record fields
    pub fn with_track_record(mut self, completed: u32, total: u32, rating: f64, reliability: f64) -> Self {
        self.completed_campaigns = completed;
        self.total_campaigns = total;
        self.rating = rating;
        self.reliability_score = reliability;
        self.completion_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        self
    }

    /// Follower tier for benchmark lookups
    pub fn tier(&self) -> FollowerTier {
        FollowerTier::from_followers(self.follower_count)
    }

    /// Historical success ratio, neutral 0.5 when there is no track record
    pub fn success_ratio(&self) -> f64 {
        if self.total_campaigns == 0 {
            0.5
        } else {
            (self.completed_campaigns as f64 / self.total_campaigns as f64).clamp(0.0, 1.0)
        }
    }

    /// Engagement rates from history, in chronological order
    pub fn engagement_history(&self) -> Vec<f64> {
        self.metrics_history.iter().map(|s| s.engagement_rate).collect()
    }

    /// Per-period follower growth ratios from history
    pub fn growth_rates(&self) -> Vec<f64> {
        self.metrics_history
            .windows(2)
            .filter(|w| w[0].follower_count > 0)
            .map(|w| (w[1].follower_count as f64 - w[0].follower_count as f64) / w[0].follower_count as f64)
            .collect()
    }

    /// Text used for the creator's embedding
    pub fn embedding_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.category.is_empty() {
            parts.push(self.category.clone());
        }
        if let Some(bio) = &self.bio {
            parts.push(bio.clone());
        }
        parts.join(" ")
    }
}

/// One periodic observation of a creator's public metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Observation time
    pub recorded_at: DateTime<Utc>,

    /// Followers at observation time
    pub follower_count: u64,

    /// Engagement rate in percent
    pub engagement_rate: f64,

    /// Posts published during the observed period (one week)
    #[serde(default)]
    pub post_count: u32,
}

impl MetricSnapshot {
    pub fn new(recorded_at: DateTime<Utc>, follower_count: u64, engagement_rate: f64, post_count: u32) -> Self {
        Self {
            recorded_at,
            follower_count,
            engagement_rate,
            post_count,
        }
    }
}

/// Follower-count bucket; each bucket has its own expected engagement band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowerTier {
    Nano,
    Micro,
    Mid,
    Macro,
    Mega,
}

/// Expected engagement band for a tier, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementBenchmark {
    /// Below this the audience is likely inflated
    pub floor: f64,
    /// Typical organic engagement
    pub typical: f64,
    /// Above this engagement is likely coordinated
    pub ceiling: f64,
}

impl FollowerTier {
    /// Determine tier from follower count
    pub fn from_followers(followers: u64) -> Self {
        match followers {
            0..=9_999 => FollowerTier::Nano,
            10_000..=49_999 => FollowerTier::Micro,
            50_000..=249_999 => FollowerTier::Mid,
            250_000..=999_999 => FollowerTier::Macro,
            _ => FollowerTier::Mega,
        }
    }

    pub fn benchmark(&self) -> EngagementBenchmark {
        let (floor, typical, ceiling) = match self {
            FollowerTier::Nano => (1.5, 4.0, 10.0),
            FollowerTier::Micro => (1.0, 2.5, 7.0),
            FollowerTier::Mid => (0.8, 1.8, 5.0),
            FollowerTier::Macro => (0.5, 1.2, 3.5),
            FollowerTier::Mega => (0.3, 0.9, 2.5),
        };
        EngagementBenchmark { floor, typical, ceiling }
    }

    /// Share of followers an average post organically reaches
    pub fn reach_rate(&self) -> f64 {
        match self {
            FollowerTier::Nano => 0.35,
            FollowerTier::Micro => 0.25,
            FollowerTier::Mid => 0.18,
            FollowerTier::Macro => 0.12,
            FollowerTier::Mega => 0.08,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(FollowerTier::from_followers(5_000), FollowerTier::Nano);
        assert_eq!(FollowerTier::from_followers(10_000), FollowerTier::Micro);
        assert_eq!(FollowerTier::from_followers(249_999), FollowerTier::Mid);
        assert_eq!(FollowerTier::from_followers(250_000), FollowerTier::Macro);
        assert_eq!(FollowerTier::from_followers(5_000_000), FollowerTier::Mega);
        assert_eq!(FollowerTier::Nano.benchmark().floor, 1.5);
    }

    #[test]
    fn test_growth_rates() {
        let now = Utc::now();
        let creator = Creator::new("c1", "tech", 1200, 3.0).with_history(vec![
            MetricSnapshot::new(now - Duration::weeks(2), 1000, 3.0, 3),
            MetricSnapshot::new(now - Duration::weeks(1), 1100, 3.1, 4),
            MetricSnapshot::new(now, 1650, 2.9, 3),
        ]);

        let rates = creator.growth_rates();
        assert_eq!(rates.len(), 2);
        assert!((rates[0] - 0.1).abs() < 1e-9);
        assert!((rates[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_creator_deserializes_with_missing_fields() {
        let creator: Creator = serde_json::from_str(r#"{"id":"c9"}"#).unwrap();
        assert_eq!(creator.id, "c9");
        assert_eq!(creator.follower_count, 0);
        assert!(creator.metrics_history.is_empty());
        assert_eq!(creator.success_ratio(), 0.5);
    }
}
