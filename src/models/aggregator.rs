//! Composite match score aggregation.
//!
//! Uses its own fixed [`AiWeights`], kept separate from the optimizer's
//! tunable match weights.

use serde::{Deserialize, Serialize};

use crate::types::{Prediction, QualityTrend};

/// Weights for combining the four match signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiWeights {
    pub semantic: f64,
    pub quality: f64,
    pub audience: f64,
    pub prediction: f64,
}

pub const AI_WEIGHTS: AiWeights = AiWeights {
    semantic: 0.25,
    quality: 0.25,
    audience: 0.20,
    prediction: 0.30,
};

/// Largest share of the total the fraud penalty may remove
pub const MAX_FRAUD_PENALTY: f64 = 0.3;

/// Match signals normalized to [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub semantic: f64,
    pub quality: f64,
    pub audience: f64,
    pub prediction: f64,
}

impl SignalScores {
    /// Defaults used when a sub-signal cannot be computed
    pub const NEUTRAL: SignalScores = SignalScores {
        semantic: 0.0,
        quality: 50.0,
        audience: 50.0,
        prediction: 50.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeBreakdown {
    pub signals: SignalScores,
    pub weighted_total: f64,
    pub fraud_penalty: f64,
    /// Final composite score (0 - 100)
    pub score: f64,
}

/// Cosine similarity to [0, 100]; negative similarity counts as none
pub fn similarity_signal(similarity: f64) -> f64 {
    similarity.clamp(0.0, 1.0) * 100.0
}

/// CQI adjusted by its recent direction
pub fn quality_signal(cqi: f64, trend: QualityTrend) -> f64 {
    let adjustment = match trend {
        QualityTrend::Rising => 5.0,
        QualityTrend::Stable => 0.0,
        QualityTrend::Declining => -5.0,
    };
    (cqi + adjustment).clamp(0.0, 100.0)
}

/// Prediction to [0, 100]: engagement, ROI and confidence
pub fn prediction_signal(prediction: &Prediction) -> f64 {
    let engagement = (prediction.predicted_engagement / 10.0 * 100.0).clamp(0.0, 100.0);
    let roi = ((prediction.predicted_roi + 50.0) / 3.5).clamp(0.0, 100.0);
    0.4 * engagement + 0.4 * roi + 0.2 * prediction.confidence.clamp(0.0, 1.0) * 100.0
}

/// Combines normalized signals into one composite score
pub struct ScoreAggregator {
    weights: AiWeights,
}

impl ScoreAggregator {
    pub fn new(weights: AiWeights) -> Self {
        Self { weights }
    }

    /// Weighted total minus a fraud penalty of up to 30% of the total
    pub fn aggregate(&self, signals: SignalScores, fraud_risk: f64) -> CompositeBreakdown {
        let w = &self.weights;
        let weighted_total = (signals.semantic * w.semantic
            + signals.quality * w.quality
            + signals.audience * w.audience
            + signals.prediction * w.prediction)
            .clamp(0.0, 100.0);

        let fraud_penalty = weighted_total * (fraud_risk.clamp(0.0, 1.0) * MAX_FRAUD_PENALTY);
        CompositeBreakdown {
            signals,
            weighted_total,
            fraud_penalty,
            score: (weighted_total - fraud_penalty).clamp(0.0, 100.0),
        }
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::new(AI_WEIGHTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let w = AI_WEIGHTS;
        assert!((w.semantic + w.quality + w.audience + w.prediction - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_aggregation() {
        let aggregator = ScoreAggregator::default();
        let signals = SignalScores {
            semantic: 80.0,
            quality: 70.0,
            audience: 60.0,
            prediction: 50.0,
        };

        let result = aggregator.aggregate(signals, 0.0);
        // 80*0.25 + 70*0.25 + 60*0.2 + 50*0.3 = 64.5
        assert!((result.score - 64.5).abs() < 1e-9);
        assert_eq!(result.fraud_penalty, 0.0);
    }

    #[test]
    fn test_fraud_penalty_capped_at_thirty_percent() {
        let aggregator = ScoreAggregator::default();
        let signals = SignalScores {
            semantic: 100.0,
            quality: 100.0,
            audience: 100.0,
            prediction: 100.0,
        };

        let result = aggregator.aggregate(signals, 1.0);
        assert!((result.score - 70.0).abs() < 1e-9);

        let half = aggregator.aggregate(signals, 0.5);
        assert!((half.score - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_neutral_defaults() {
        let result = ScoreAggregator::default().aggregate(SignalScores::NEUTRAL, 0.0);
        // 0 + 12.5 + 10 + 15
        assert!((result.score - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_quality_signal_trend() {
        assert_eq!(quality_signal(50.0, QualityTrend::Rising), 55.0);
        assert_eq!(quality_signal(98.0, QualityTrend::Rising), 100.0);
        assert_eq!(quality_signal(2.0, QualityTrend::Declining), 0.0);
        assert_eq!(similarity_signal(-0.3), 0.0);
    }
}
