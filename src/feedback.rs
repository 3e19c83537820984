//! Outcome feedback capture and accuracy reporting.
//!
//! Completed campaigns are joined with the stored prediction for the pair to
//! produce ground-truth records. Accuracy and insights are advisory; nothing
//! here triggers retraining.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::store::Store;
use crate::types::feedback::{CampaignSnapshot, CreatorSnapshot};
use crate::types::{CampaignOutcome, FeedbackFilter, FeedbackRecord};

/// Floor on |actual| when computing relative error
pub const RELATIVE_ERROR_EPSILON: f64 = 0.01;

const MIN_RECORDS_FOR_INSIGHT: usize = 10;
const RETRAIN_ACCURACY: f64 = 0.70;
const CATEGORY_ERROR_LIMIT: f64 = 0.40;
const CATEGORY_MIN_SAMPLES: usize = 3;
const ROI_DRIFT_ACCURACY: f64 = 0.60;
const HEALTHY_ACCURACY: f64 = 0.85;

/// |predicted - actual| / max(eps, |actual|)
pub fn relative_error(predicted: f64, actual: f64) -> f64 {
    (predicted - actual).abs() / actual.abs().max(RELATIVE_ERROR_EPSILON)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAccuracy {
    /// Mean absolute error in the metric's own unit
    pub mae: f64,
    pub mean_relative_error: f64,
    /// max(0, 1 - mean relative error)
    pub accuracy: f64,
}

impl MetricAccuracy {
    fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        if pairs.is_empty() {
            return Self::default();
        }
        let n = pairs.len() as f64;
        let mae = pairs.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / n;
        let mean_relative_error = pairs.iter().map(|(p, a)| relative_error(*p, *a)).sum::<f64>() / n;
        Self {
            mae,
            mean_relative_error,
            accuracy: (1.0 - mean_relative_error).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    pub samples: usize,
    /// Mean engagement relative error
    pub mean_error: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    /// Records with a prediction to compare against
    pub sample_count: usize,
    pub engagement: MetricAccuracy,
    pub roi: MetricAccuracy,
    pub by_category: BTreeMap<String, CategoryAccuracy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    MoreDataNeeded,
    RetrainRecommended,
    CategoryNeedsTuning,
    RoiDrift,
    PerformingWell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub message: String,
    pub priority: Priority,
}

/// Summarize prediction accuracy over a set of feedback records
pub fn accuracy_of(records: &[FeedbackRecord]) -> ModelAccuracy {
    let scored: Vec<&FeedbackRecord> = records.iter().filter(|r| r.has_prediction()).collect();

    let engagement: Vec<(f64, f64)> = scored
        .iter()
        .filter_map(|r| r.predicted_engagement.map(|p| (p, r.actual_engagement)))
        .collect();
    let roi: Vec<(f64, f64)> = scored
        .iter()
        .filter_map(|r| r.predicted_roi.map(|p| (p, r.actual_roi)))
        .collect();

    let mut grouped: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for record in &scored {
        if let Some(p) = record.predicted_engagement {
            grouped
                .entry(record.campaign_snapshot.category.clone())
                .or_default()
                .push((p, record.actual_engagement));
        }
    }
    let by_category = grouped
        .into_iter()
        .map(|(category, pairs)| {
            let m = MetricAccuracy::from_pairs(&pairs);
            (
                category,
                CategoryAccuracy {
                    samples: pairs.len(),
                    mean_error: m.mean_relative_error,
                    accuracy: m.accuracy,
                },
            )
        })
        .collect();

    ModelAccuracy {
        sample_count: scored.len(),
        engagement: MetricAccuracy::from_pairs(&engagement),
        roi: MetricAccuracy::from_pairs(&roi),
        by_category,
    }
}

/// Threshold-driven advisory insights
pub fn insights_for(completed: usize, accuracy: &ModelAccuracy) -> Vec<Insight> {
    let mut insights = Vec::new();

    if completed < MIN_RECORDS_FOR_INSIGHT {
        insights.push(Insight {
            kind: InsightKind::MoreDataNeeded,
            message: format!(
                "Only {} completed campaigns recorded; at least {} are needed for reliable accuracy estimates",
                completed, MIN_RECORDS_FOR_INSIGHT
            ),
            priority: Priority::High,
        });
    }

    if accuracy.sample_count > 0 && accuracy.engagement.accuracy < RETRAIN_ACCURACY {
        insights.push(Insight {
            kind: InsightKind::RetrainRecommended,
            message: format!(
                "Engagement prediction accuracy is {:.1}%, below the {:.0}% target; retraining recommended",
                accuracy.engagement.accuracy * 100.0,
                RETRAIN_ACCURACY * 100.0
            ),
            priority: Priority::High,
        });
    }

    for (category, stats) in &accuracy.by_category {
        if stats.samples >= CATEGORY_MIN_SAMPLES && stats.mean_error > CATEGORY_ERROR_LIMIT {
            insights.push(Insight {
                kind: InsightKind::CategoryNeedsTuning,
                message: format!(
                    "Category '{}' has {:.1}% mean engagement error over {} campaigns; benchmarks need tuning",
                    category,
                    stats.mean_error * 100.0,
                    stats.samples
                ),
                priority: Priority::Medium,
            });
        }
    }

    if accuracy.sample_count > 0 && accuracy.roi.accuracy < ROI_DRIFT_ACCURACY {
        insights.push(Insight {
            kind: InsightKind::RoiDrift,
            message: format!(
                "ROI prediction accuracy is {:.1}%; ROI predictions are drifting from outcomes",
                accuracy.roi.accuracy * 100.0
            ),
            priority: Priority::Medium,
        });
    }

    if completed >= MIN_RECORDS_FOR_INSIGHT && accuracy.engagement.accuracy >= HEALTHY_ACCURACY {
        insights.push(Insight {
            kind: InsightKind::PerformingWell,
            message: format!(
                "Engagement predictions are {:.1}% accurate over {} campaigns",
                accuracy.engagement.accuracy * 100.0,
                accuracy.sample_count
            ),
            priority: Priority::Low,
        });
    }

    insights
}

/// Feedback capture and reporting service
pub struct FeedbackLoop {
    store: Arc<dyn Store>,
}

impl FeedbackLoop {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record actual results for a completed (campaign, creator) pair
    pub async fn record_campaign_feedback(&self, outcome: CampaignOutcome) -> EngineResult<FeedbackRecord> {
        let campaign = self
            .store
            .get_campaign(&outcome.campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Campaign", &outcome.campaign_id))?;
        let creator = self
            .store
            .get_creator(&outcome.creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", &outcome.creator_id))?;

        let prediction = self
            .store
            .get_prediction(&outcome.campaign_id, &outcome.creator_id)
            .await?;
        if prediction.is_none() {
            debug!(
                campaign_id = %outcome.campaign_id,
                creator_id = %outcome.creator_id,
                "No stored prediction for pair, recording actuals only"
            );
        }

        let cqi_score = match self.store.get_quality_index(&outcome.creator_id).await {
            Ok(q) => q.map(|q| q.score),
            Err(e) => {
                warn!(creator_id = %outcome.creator_id, error = %e, "Quality lookup failed for snapshot");
                None
            }
        };

        let predicted = prediction.as_ref().map(|p| &p.prediction);
        let record = FeedbackRecord {
            campaign_id: outcome.campaign_id.clone(),
            creator_id: outcome.creator_id.clone(),
            predicted_engagement: predicted.map(|p| p.predicted_engagement),
            predicted_roi: predicted.map(|p| p.predicted_roi),
            predicted_reach: predicted.map(|p| p.predicted_reach),
            actual_engagement: outcome.actual_engagement,
            actual_roi: outcome.actual_roi,
            actual_reach: outcome.actual_reach,
            engagement_error: predicted.map(|p| relative_error(p.predicted_engagement, outcome.actual_engagement)),
            roi_error: predicted.map(|p| relative_error(p.predicted_roi, outcome.actual_roi)),
            success: outcome.success.unwrap_or(outcome.actual_roi > 0.0),
            model_version: predicted.map(|p| p.model_version.clone()),
            features: prediction.as_ref().map(|p| p.features.clone()).unwrap_or_default(),
            creator_snapshot: CreatorSnapshot::capture(&creator, cqi_score),
            campaign_snapshot: CampaignSnapshot::from(&campaign),
            completed_at: Utc::now(),
        };

        self.store.upsert_feedback(record.clone()).await?;
        info!(
            campaign_id = %record.campaign_id,
            creator_id = %record.creator_id,
            engagement_error = ?record.engagement_error,
            success = record.success,
            "Campaign feedback recorded"
        );
        Ok(record)
    }

    /// Accuracy over all scored feedback, optionally for one model version
    pub async fn get_model_accuracy(&self, model_version: Option<&str>) -> EngineResult<ModelAccuracy> {
        let filter = FeedbackFilter {
            model_version: model_version.map(str::to_string),
            ..FeedbackFilter::default()
        };
        let records = self.store.list_feedback(&filter).await?;
        Ok(accuracy_of(&records))
    }

    pub async fn get_improvement_insights(&self) -> EngineResult<Vec<Insight>> {
        let records = self.store.list_feedback(&FeedbackFilter::default()).await?;
        let accuracy = accuracy_of(&records);
        Ok(insights_for(records.len(), &accuracy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::prediction::ConfidenceInterval;
    use crate::types::{Campaign, CampaignPrediction, Creator, Prediction};
    use std::collections::HashMap;

    fn record(category: &str, predicted: f64, actual: f64) -> FeedbackRecord {
        FeedbackRecord {
            campaign_id: uuid::Uuid::new_v4().to_string(),
            creator_id: "c1".to_string(),
            predicted_engagement: Some(predicted),
            predicted_roi: Some(100.0),
            predicted_reach: Some(1_000),
            actual_engagement: actual,
            actual_roi: 100.0,
            actual_reach: 1_000,
            engagement_error: Some(relative_error(predicted, actual)),
            roi_error: Some(0.0),
            success: true,
            model_version: Some("v1.0".to_string()),
            features: HashMap::new(),
            creator_snapshot: CreatorSnapshot::default(),
            campaign_snapshot: CampaignSnapshot {
                category: category.to_string(),
                ..CampaignSnapshot::default()
            },
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_relative_error_guards_zero_actual() {
        assert_eq!(relative_error(2.0, 2.0), 0.0);
        assert!((relative_error(3.0, 2.0) - 0.5).abs() < 1e-12);
        assert!((relative_error(0.5, 0.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_never_negative() {
        let records = vec![record("tech", 10.0, 1.0), record("tech", 12.0, 2.0)];
        let accuracy = accuracy_of(&records);
        assert_eq!(accuracy.engagement.accuracy, 0.0);
        assert!(accuracy.engagement.mae > 9.0);
    }

    #[test]
    fn test_insights_thresholds() {
        let mut records: Vec<FeedbackRecord> = (0..3).map(|_| record("food", 5.0, 3.0)).collect();
        records.extend((0..3).map(|_| record("tech", 3.0, 3.0)));
        let accuracy = accuracy_of(&records);
        let insights = insights_for(records.len(), &accuracy);

        let kinds: Vec<InsightKind> = insights.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&InsightKind::MoreDataNeeded));
        assert!(kinds.contains(&InsightKind::CategoryNeedsTuning));
        assert!(!kinds.contains(&InsightKind::RetrainRecommended));
        let tuning = insights
            .iter()
            .find(|i| i.kind == InsightKind::CategoryNeedsTuning)
            .unwrap();
        assert!(tuning.message.contains("food"));
        assert_eq!(tuning.priority, Priority::Medium);
    }

    #[test]
    fn test_low_accuracy_recommends_retrain() {
        let records: Vec<FeedbackRecord> = (0..12).map(|_| record("tech", 6.0, 3.0)).collect();
        let insights = insights_for(records.len(), &accuracy_of(&records));
        assert_eq!(insights[0].kind, InsightKind::RetrainRecommended);
        assert_eq!(insights[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_record_joins_stored_prediction() {
        let store = Arc::new(MemoryStore::new());
        store.insert_creator(Creator::new("c1", "tech", 20_000, 2.5)).await;
        store.insert_campaign(Campaign::new("k1", "tech", 800.0)).await;
        store
            .upsert_prediction(CampaignPrediction {
                campaign_id: "k1".to_string(),
                creator_id: "c1".to_string(),
                prediction: Prediction {
                    predicted_engagement: 3.0,
                    predicted_reach: 5_000,
                    predicted_roi: 120.0,
                    confidence_interval: ConfidenceInterval::default(),
                    risk_score: 0.2,
                    confidence: 0.7,
                    model_version: "v1.2".to_string(),
                },
                features: HashMap::from([("quality".to_string(), 0.7)]),
                predicted_at: Utc::now(),
            })
            .await
            .unwrap();

        let feedback = FeedbackLoop::new(store.clone());
        let record = feedback
            .record_campaign_feedback(CampaignOutcome {
                campaign_id: "k1".to_string(),
                creator_id: "c1".to_string(),
                actual_engagement: 2.0,
                actual_roi: -10.0,
                actual_reach: 4_000,
                success: None,
            })
            .await
            .unwrap();

        assert_eq!(record.predicted_engagement, Some(3.0));
        assert!((record.engagement_error.unwrap() - 0.5).abs() < 1e-12);
        assert!(!record.success);
        assert_eq!(record.model_version.as_deref(), Some("v1.2"));
        assert_eq!(record.features.get("quality"), Some(&0.7));
        assert_eq!(record.campaign_snapshot.category, "tech");

        let accuracy = feedback.get_model_accuracy(Some("v1.2")).await.unwrap();
        assert_eq!(accuracy.sample_count, 1);
        assert!((accuracy.engagement.accuracy - 0.5).abs() < 1e-12);
        assert_eq!(feedback.get_model_accuracy(Some("v9.9")).await.unwrap().sample_count, 0);
    }

    #[tokio::test]
    async fn test_record_unknown_pair() {
        let feedback = FeedbackLoop::new(Arc::new(MemoryStore::new()));
        let err = feedback
            .record_campaign_feedback(CampaignOutcome {
                campaign_id: "nope".to_string(),
                creator_id: "c1".to_string(),
                actual_engagement: 1.0,
                actual_roi: 1.0,
                actual_reach: 0,
                success: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
