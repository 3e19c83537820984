//! Fraud signal data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signal severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Contribution of one fully confident signal to the overall risk
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 0.1,
            Severity::Medium => 0.25,
            Severity::High => 0.5,
            Severity::Critical => 0.8,
        }
    }
}

/// Anomaly family a signal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    FollowerSpike,
    EngagementManipulation,
    BotActivity,
    FakeComments,
    AccountAgeAnomaly,
}

/// Per-creator anomaly record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudSignal {
    /// Unique signal identifier
    pub id: String,

    pub creator_id: String,

    pub signal_type: SignalType,

    pub severity: Severity,

    /// Detector confidence (0.0 - 1.0)
    pub confidence: f64,

    /// Opaque evidence blob
    #[serde(default)]
    pub evidence: serde_json::Value,

    /// Set only by an explicit admin action
    #[serde(default)]
    pub resolved: bool,

    pub detected_at: DateTime<Utc>,
}

impl FraudSignal {
    /// Create a new unresolved signal
    pub fn new(
        creator_id: impl Into<String>,
        signal_type: SignalType,
        severity: Severity,
        confidence: f64,
        evidence: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            creator_id: creator_id.into(),
            signal_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            resolved: false,
            detected_at: Utc::now(),
        }
    }

    /// Weighted contribution to the overall risk score
    pub fn risk_contribution(&self) -> f64 {
        self.severity.weight() * self.confidence
    }
}

/// Action recommended for a creator given the overall risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Clear,
    LowConcern,
    Monitor,
    FlagForReview,
}

impl Recommendation {
    /// Determine recommendation from risk score and thresholds
    pub fn from_risk(risk: f64, thresholds: &RecommendationThresholds) -> Self {
        if risk >= thresholds.flag_for_review {
            Recommendation::FlagForReview
        } else if risk >= thresholds.monitor {
            Recommendation::Monitor
        } else if risk >= thresholds.low_concern {
            Recommendation::LowConcern
        } else {
            Recommendation::Clear
        }
    }
}

/// Configurable recommendation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationThresholds {
    pub low_concern: f64,
    pub monitor: f64,
    pub flag_for_review: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            low_concern: 0.2,
            monitor: 0.4,
            flag_for_review: 0.7,
        }
    }
}

/// Result of one fraud analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAnalysis {
    pub creator_id: String,
    /// Overall risk (0.0 - 1.0)
    pub fraud_risk_score: f64,
    /// Union of newly detected and still-unresolved signals
    pub signals: Vec<FraudSignal>,
    /// Signals persisted during this pass
    pub new_signals: usize,
    pub recommendation: Recommendation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_from_risk() {
        let thresholds = RecommendationThresholds::default();

        assert_eq!(Recommendation::from_risk(0.0, &thresholds), Recommendation::Clear);
        assert_eq!(Recommendation::from_risk(0.25, &thresholds), Recommendation::LowConcern);
        assert_eq!(Recommendation::from_risk(0.5, &thresholds), Recommendation::Monitor);
        assert_eq!(Recommendation::from_risk(0.95, &thresholds), Recommendation::FlagForReview);
    }

    #[test]
    fn test_signal_serialization() {
        let signal = FraudSignal::new(
            "creator_1",
            SignalType::FakeComments,
            Severity::High,
            0.8,
            serde_json::json!({"ratio": 0.27}),
        );

        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("\"FAKE_COMMENTS\""));
        assert!(json.contains("\"HIGH\""));

        let deserialized: FraudSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.signal_type, SignalType::FakeComments);
        assert_eq!(deserialized.severity, Severity::High);
        assert!(!deserialized.resolved);
    }
}
