//! Audience profiles and campaign audience fit

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::{run_page, BatchSummary};
use crate::error::{EngineError, EngineResult};
use crate::feature_extractor::category_match;
use crate::store::Store;
use crate::types::{AudienceProfile, Campaign};

/// 1.0 inside the targeted follower range, shrinking with distance outside it
pub fn follower_range_fit(followers: u64, min: Option<u64>, max: Option<u64>) -> f64 {
    match (min, max) {
        (Some(min), _) if followers < min => {
            if min == 0 {
                1.0
            } else {
                followers as f64 / min as f64
            }
        }
        (_, Some(max)) if followers > max => max as f64 / followers as f64,
        _ => 1.0,
    }
}

/// 1.0 when untargeted or matched, 0.5 when the location is unknown
pub fn location_fit(location: Option<&str>, targets: &[String]) -> f64 {
    if targets.is_empty() {
        return 1.0;
    }
    match location {
        Some(loc) if targets.iter().any(|t| t.eq_ignore_ascii_case(loc)) => 1.0,
        Some(_) => 0.0,
        None => 0.5,
    }
}

/// Audience fit of a creator profile for a campaign (0 - 100)
pub fn audience_fit(profile: &AudienceProfile, campaign: &Campaign) -> f64 {
    let location = location_fit(profile.primary_location.as_deref(), &campaign.target_locations);
    let followers = follower_range_fit(profile.follower_count, campaign.min_followers, campaign.max_followers);
    let category = category_match(&profile.category, &campaign.category);

    let fit = 0.35 * location + 0.25 * followers + 0.25 * category + 0.15 * profile.quality_factor.clamp(0.0, 1.0);
    (fit * 100.0).clamp(0.0, 100.0)
}

/// Audience profile computation service
pub struct AudienceEngine {
    store: Arc<dyn Store>,
}

impl AudienceEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn compute_profile(&self, creator_id: &str) -> EngineResult<AudienceProfile> {
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", creator_id))?;

        let quality = match self.store.get_quality_index(creator_id).await {
            Ok(q) => q,
            Err(e) => {
                warn!(creator_id = %creator_id, error = %e, "Quality lookup failed, using neutral audience quality");
                None
            }
        };
        let base = quality.as_ref().map(|q| q.score / 100.0).unwrap_or(0.5);
        let fraud = quality.as_ref().map(|q| q.fraud_risk_score).unwrap_or(0.0);
        let quality_factor = (base * (1.0 - 0.5 * fraud.clamp(0.0, 1.0))).clamp(0.0, 1.0);

        let tier = creator.tier();
        let active_audience_estimate =
            (creator.follower_count as f64 * tier.reach_rate() * (0.5 + 0.5 * quality_factor)).round() as u64;

        let profile = AudienceProfile {
            creator_id: creator_id.to_string(),
            primary_location: creator.location.clone(),
            tier,
            follower_count: creator.follower_count,
            category: creator.category.clone(),
            active_audience_estimate,
            quality_factor,
            computed_at: Utc::now(),
        };
        self.store.upsert_audience_profile(profile.clone()).await?;

        debug!(
            creator_id = %creator_id,
            tier = ?tier,
            active_audience = active_audience_estimate,
            quality_factor,
            "Audience profile computed"
        );
        Ok(profile)
    }

    /// Fit for a campaign, computing the profile when none is stored yet
    pub async fn fit_for(&self, creator_id: &str, campaign: &Campaign) -> EngineResult<f64> {
        let profile = match self.store.get_audience_profile(creator_id).await? {
            Some(profile) => profile,
            None => self.compute_profile(creator_id).await?,
        };
        Ok(audience_fit(&profile, campaign))
    }

    pub async fn compute_all(&self, page_size: usize) -> EngineResult<BatchSummary> {
        let page_size = page_size.max(1);
        let mut summary = BatchSummary::default();
        let mut offset = 0;

        loop {
            let page = self.store.list_creators(offset, page_size).await?;
            let count = page.len();
            run_page(
                "audience",
                page.into_iter().map(|c| c.id),
                |id| async move { self.compute_profile(&id).await },
                &mut summary,
            )
            .await;
            offset += count;
            if count < page_size {
                break;
            }
        }

        info!(processed = summary.processed, errors = summary.errors, "Audience pass complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Creator, FollowerTier};

    fn profile(location: Option<&str>, followers: u64, category: &str) -> AudienceProfile {
        AudienceProfile {
            creator_id: "c1".to_string(),
            primary_location: location.map(str::to_string),
            tier: FollowerTier::from_followers(followers),
            follower_count: followers,
            category: category.to_string(),
            active_audience_estimate: 0,
            quality_factor: 1.0,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_range_and_location_fit() {
        assert_eq!(follower_range_fit(5_000, Some(10_000), None), 0.5);
        assert_eq!(follower_range_fit(200_000, None, Some(100_000)), 0.5);
        assert_eq!(follower_range_fit(50_000, Some(10_000), Some(100_000)), 1.0);

        let targets = vec!["Lisbon".to_string()];
        assert_eq!(location_fit(Some("lisbon"), &targets), 1.0);
        assert_eq!(location_fit(Some("Porto"), &targets), 0.0);
        assert_eq!(location_fit(None, &targets), 0.5);
        assert_eq!(location_fit(None, &[]), 1.0);
    }

    #[test]
    fn test_perfect_fit_scores_hundred() {
        let mut campaign = Campaign::new("k1", "food", 300.0);
        campaign.target_locations = vec!["Lisbon".to_string()];
        let fit = audience_fit(&profile(Some("Lisbon"), 20_000, "food"), &campaign);
        assert!((fit - 100.0).abs() < 1e-9);

        let miss = audience_fit(&profile(Some("Oslo"), 20_000, "tech"), &campaign);
        assert!(miss < 50.0);
    }

    #[tokio::test]
    async fn test_profile_persisted_and_reused() {
        let store = Arc::new(MemoryStore::new());
        let mut creator = Creator::new("c1", "travel", 120_000, 2.0);
        creator.location = Some("Rome".to_string());
        store.insert_creator(creator).await;

        let engine = AudienceEngine::new(store.clone());
        let profile = engine.compute_profile("c1").await.unwrap();
        assert_eq!(profile.tier, FollowerTier::Mid);
        assert!(profile.active_audience_estimate > 0);
        assert!(profile.active_audience_estimate < 120_000);
        assert!((profile.quality_factor - 0.5).abs() < 1e-9);

        let stored = store.get_audience_profile("c1").await.unwrap().unwrap();
        assert_eq!(stored.primary_location.as_deref(), Some("Rome"));

        let fit = engine.fit_for("c1", &Campaign::new("k1", "travel", 1_000.0)).await.unwrap();
        assert!(fit > 80.0);
        assert!(engine.compute_profile("ghost").await.unwrap_err().is_not_found());
    }
}
