//! Rule-based fraud and anomaly detection.
//!
//! Five independent detectors inspect a creator's current metrics and
//! history. Each either emits a signal or nothing. New signals are
//! deduplicated by type against unresolved ones before being stored, and the
//! overall risk is the capped sum of `severity weight x confidence` over every
//! unresolved signal. Signals are never resolved here.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::{run_page, BatchSummary};
use crate::error::{EngineError, EngineResult};
use crate::store::Store;
use crate::types::fraud::RecommendationThresholds;
use crate::types::{Creator, FraudAnalysis, FraudSignal, Recommendation, Severity, SignalType};

/// Single-period follower growth above this is a spike
const SPIKE_GROWTH: f64 = 0.15;
/// Engagement above this multiple of the tier benchmark is suspicious
const MANIPULATION_MULTIPLE: f64 = 3.0;
/// Engagement history less variable than this looks automated
const BOT_MAX_CV: f64 = 0.05;
const BOT_MIN_SAMPLES: usize = 7;
/// Mismatch checks only apply from this audience size up
const MISMATCH_MIN_FOLLOWERS: u64 = 1_000;
/// Accounts older than this are not checked for implausible growth
const AGE_CHECK_MAX_DAYS: i64 = 730;
const MAX_PLAUSIBLE_DAILY_GROWTH: f64 = 1_000.0;

/// Follower growth above 15% in a single observed period
pub fn detect_follower_spike(creator: &Creator) -> Option<FraudSignal> {
    let growth = creator.growth_rates().into_iter().fold(f64::MIN, f64::max);
    if growth <= SPIKE_GROWTH {
        return None;
    }

    let severity = if growth > 1.0 {
        Severity::Critical
    } else if growth > 0.5 {
        Severity::High
    } else if growth > 0.3 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Some(FraudSignal::new(
        &creator.id,
        SignalType::FollowerSpike,
        severity,
        (0.5 + growth * 0.5).min(0.95),
        json!({ "max_period_growth": growth, "threshold": SPIKE_GROWTH }),
    ))
}

/// Engagement more than 3x the tier benchmark
pub fn detect_engagement_manipulation(creator: &Creator) -> Option<FraudSignal> {
    let typical = creator.tier().benchmark().typical;
    let ratio = creator.engagement_rate / typical;
    if ratio <= MANIPULATION_MULTIPLE {
        return None;
    }

    let severity = if ratio >= 6.0 {
        Severity::Critical
    } else if ratio >= 4.5 {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(FraudSignal::new(
        &creator.id,
        SignalType::EngagementManipulation,
        severity,
        (0.5 + (ratio - MANIPULATION_MULTIPLE) * 0.1).min(0.9),
        json!({
            "engagement_rate": creator.engagement_rate,
            "tier_benchmark": typical,
            "ratio": ratio,
        }),
    ))
}

/// Engagement history too consistent to be organic
pub fn detect_bot_activity(creator: &Creator) -> Option<FraudSignal> {
    let history = creator.engagement_history();
    if history.len() < BOT_MIN_SAMPLES {
        return None;
    }

    let cv = coefficient_of_variation(&history)?;
    if cv >= BOT_MAX_CV {
        return None;
    }

    let severity = if cv < 0.02 { Severity::High } else { Severity::Medium };
    Some(FraudSignal::new(
        &creator.id,
        SignalType::BotActivity,
        severity,
        (0.6 + (BOT_MAX_CV - cv) * 6.0).min(0.9),
        json!({ "coefficient_of_variation": cv, "samples": history.len() }),
    ))
}

/// Engagement below the tier floor despite a sizeable audience
pub fn detect_follower_engagement_mismatch(creator: &Creator) -> Option<FraudSignal> {
    if creator.follower_count < MISMATCH_MIN_FOLLOWERS {
        return None;
    }

    let floor = creator.tier().benchmark().floor;
    if creator.engagement_rate >= floor {
        return None;
    }

    let ratio = (creator.engagement_rate / floor).max(0.0);
    let severity = if ratio < 0.1 {
        Severity::Critical
    } else if ratio < 0.3 {
        Severity::High
    } else if ratio < 0.6 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Some(FraudSignal::new(
        &creator.id,
        SignalType::FakeComments,
        severity,
        (0.4 + (1.0 - ratio) * 0.5).min(0.9),
        json!({
            "follower_count": creator.follower_count,
            "engagement_rate": creator.engagement_rate,
            "tier_floor": floor,
            "ratio": ratio,
        }),
    ))
}

/// Daily follower growth implausible for the account's age
pub fn detect_age_growth_anomaly(creator: &Creator, now: DateTime<Utc>) -> Option<FraudSignal> {
    let created = creator.account_created_at?;
    let age_days = (now - created).num_days().max(1);
    if age_days > AGE_CHECK_MAX_DAYS {
        return None;
    }

    let daily = creator.follower_count as f64 / age_days as f64;
    if daily <= MAX_PLAUSIBLE_DAILY_GROWTH {
        return None;
    }

    let severity = if daily > 10_000.0 {
        Severity::High
    } else if daily > 3_000.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Some(FraudSignal::new(
        &creator.id,
        SignalType::AccountAgeAnomaly,
        severity,
        0.5 + (daily / 25_000.0).min(0.4),
        json!({ "account_age_days": age_days, "daily_growth": daily }),
    ))
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}

/// Overall risk from a set of signals, capped at 1.0
pub fn risk_from_signals(signals: &[FraudSignal]) -> f64 {
    signals
        .iter()
        .map(FraudSignal::risk_contribution)
        .sum::<f64>()
        .min(1.0)
}

/// Run every detector against a creator
pub fn run_detectors(creator: &Creator, now: DateTime<Utc>) -> Vec<FraudSignal> {
    [
        detect_follower_spike(creator),
        detect_engagement_manipulation(creator),
        detect_bot_activity(creator),
        detect_follower_engagement_mismatch(creator),
        detect_age_growth_anomaly(creator, now),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Fraud detection service
pub struct FraudDetector {
    store: Arc<dyn Store>,
    thresholds: RecommendationThresholds,
}

impl FraudDetector {
    pub fn new(store: Arc<dyn Store>, thresholds: RecommendationThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Analyze one creator, persisting any new signal types
    pub async fn analyze_creator(&self, creator_id: &str) -> EngineResult<FraudAnalysis> {
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", creator_id))?;

        let existing = self.store.unresolved_fraud_signals(creator_id).await?;
        let open_types: HashSet<SignalType> = existing.iter().map(|s| s.signal_type).collect();

        let mut signals = existing;
        let mut new_signals = 0;
        for signal in run_detectors(&creator, Utc::now()) {
            if open_types.contains(&signal.signal_type) {
                debug!(
                    creator_id = %creator_id,
                    signal_type = ?signal.signal_type,
                    "Unresolved signal of this type already exists"
                );
                continue;
            }
            self.store.insert_fraud_signal(signal.clone()).await?;
            new_signals += 1;
            signals.push(signal);
        }

        let fraud_risk_score = risk_from_signals(&signals);
        let recommendation = Recommendation::from_risk(fraud_risk_score, &self.thresholds);

        if recommendation == Recommendation::FlagForReview {
            warn!(
                creator_id = %creator_id,
                risk_score = fraud_risk_score,
                signals = signals.len(),
                "Creator flagged for review"
            );
        } else {
            debug!(
                creator_id = %creator_id,
                risk_score = fraud_risk_score,
                recommendation = ?recommendation,
                "Fraud analysis complete"
            );
        }

        Ok(FraudAnalysis {
            creator_id: creator_id.to_string(),
            fraud_risk_score,
            signals,
            new_signals,
            recommendation,
        })
    }

    /// Analyze every creator, page by page
    pub async fn analyze_all(&self, page_size: usize) -> EngineResult<BatchSummary> {
        let page_size = page_size.max(1);
        let mut summary = BatchSummary::default();
        let mut offset = 0;

        loop {
            let page = self.store.list_creators(offset, page_size).await?;
            let count = page.len();
            run_page(
                "fraud",
                page.into_iter().map(|c| c.id),
                |id| async move { self.analyze_creator(&id).await },
                &mut summary,
            )
            .await;
            offset += count;
            if count < page_size {
                break;
            }
        }

        info!(processed = summary.processed, errors = summary.errors, "Fraud pass complete");
        Ok(summary)
    }
}
