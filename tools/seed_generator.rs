//! Seed Data Generator
//!
//! Writes a JSON seed file of random creators, campaigns and completed
//! campaign feedback for the scheduler binary's in-memory store. A share of
//! the creators is generated with deliberately suspicious metrics.

use chrono::{Duration, Utc};
use creator_scoring_engine::store::SeedData;
use creator_scoring_engine::types::feedback::{CampaignSnapshot, CreatorSnapshot};
use creator_scoring_engine::types::{Campaign, Creator, FeedbackRecord, FollowerTier, MetricSnapshot};
use rand::Rng;
use std::collections::HashMap;
use tracing::info;

const CATEGORIES: &[&str] = &[
    "fashion", "beauty", "tech", "gaming", "fitness", "food", "travel", "lifestyle",
];
const LOCATIONS: &[&str] = &["Berlin", "Lisbon", "London", "Paris", "Madrid", "Milan", "Warsaw"];
const FORMATS: &[&str] = &["post", "carousel", "reel", "video", "story"];

/// Random marketplace data generator
struct SeedGenerator {
    rng: rand::rngs::ThreadRng,
    creator_counter: u64,
    campaign_counter: u64,
}

impl SeedGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            creator_counter: 0,
            campaign_counter: 0,
        }
    }

    fn base_creator(&mut self, followers: u64, engagement_rate: f64) -> Creator {
        self.creator_counter += 1;
        let category = self.random_choice(CATEGORIES);
        let total = self.rng.gen_range(0..20);
        let completed = if total > 0 { self.rng.gen_range(0..=total) } else { 0 };

        let mut creator = Creator::new(format!("creator_{:06}", self.creator_counter), category, followers, engagement_rate)
            .with_track_record(
                completed,
                total,
                self.rng.gen_range(2.5..5.0),
                self.rng.gen_range(40.0..100.0),
            );
        creator.name = format!("Creator {}", self.creator_counter);
        creator.location = Some(self.random_choice(LOCATIONS).to_string());
        creator.bio = Some(format!(
            "{} creator based in {} sharing {} content with an engaged community",
            category,
            creator.location.as_deref().unwrap_or("Europe"),
            self.random_choice(FORMATS)
        ));
        creator.account_created_at = Some(Utc::now() - Duration::days(self.rng.gen_range(400..3000)));
        creator
    }

    /// Weekly history ending at `followers`, growing at `weekly_growth` with jittered engagement
    fn history(&mut self, followers: u64, engagement_rate: f64, weekly_growth: f64, jitter: f64) -> Vec<MetricSnapshot> {
        let weeks = 12;
        let start = Utc::now() - Duration::weeks(weeks);
        let mut count = followers as f64 / (1.0 + weekly_growth).powi(weeks as i32 - 1);
        (0..weeks)
            .map(|i| {
                let er = if jitter > 0.0 {
                    (engagement_rate * self.rng.gen_range(1.0 - jitter..1.0 + jitter)).max(0.01)
                } else {
                    engagement_rate
                };
                let snapshot = MetricSnapshot::new(
                    start + Duration::weeks(i),
                    count.round() as u64,
                    er,
                    self.rng.gen_range(1..6),
                );
                count *= 1.0 + weekly_growth;
                snapshot
            })
            .collect()
    }

    /// Generate an organic-looking creator
    fn generate_organic(&mut self) -> Creator {
        let followers = 10f64.powf(self.rng.gen_range(3.0..6.3)) as u64;
        let band = FollowerTier::from_followers(followers).benchmark();
        let er = self.rng.gen_range(band.floor..band.ceiling);
        let growth = self.rng.gen_range(0.0..0.04);
        let history = self.history(followers, er, growth, 0.25);
        self.base_creator(followers, er).with_history(history)
    }

    /// Generate a creator tripping one of the fraud detectors
    fn generate_suspicious(&mut self) -> Creator {
        let followers = 10f64.powf(self.rng.gen_range(3.5..6.0)) as u64;
        match self.rng.gen_range(0..4) {
            // Purchased followers: one huge spike
            0 => {
                let mut history = self.history(followers / 2, 2.0, 0.01, 0.2);
                history.push(MetricSnapshot::new(Utc::now(), followers, 1.2, 3));
                self.base_creator(followers, 1.2).with_history(history)
            }
            // Follower/engagement mismatch
            1 => {
                let er = self.rng.gen_range(0.05..0.3);
                let history = self.history(followers, er, 0.01, 0.2);
                self.base_creator(followers, er).with_history(history)
            }
            // Bot-like flat engagement
            2 => {
                let er = self.rng.gen_range(2.0..4.0);
                let history = self.history(followers, er, 0.01, 0.0);
                self.base_creator(followers, er).with_history(history)
            }
            // Young account with implausible growth
            _ => {
                let followers = self.rng.gen_range(400_000..2_000_000);
                let mut creator = self.base_creator(followers, 1.5);
                creator.account_created_at = Some(Utc::now() - Duration::days(self.rng.gen_range(30..120)));
                creator
            }
        }
    }

    fn generate_campaign(&mut self) -> Campaign {
        self.campaign_counter += 1;
        let category = self.random_choice(CATEGORIES);
        let mut campaign = Campaign::new(
            format!("campaign_{:05}", self.campaign_counter),
            category,
            self.rng.gen_range(200.0..20_000.0),
        )
        .with_text(
            format!("{} launch {}", category, self.campaign_counter),
            format!("Looking for {} creators to showcase our new collection", category),
        )
        .with_format(self.random_choice(FORMATS));

        if self.rng.gen_bool(0.5) {
            campaign.target_locations = vec![self.random_choice(LOCATIONS).to_string()];
        }
        if self.rng.gen_bool(0.4) {
            campaign.min_followers = Some(self.rng.gen_range(5_000..50_000));
        }
        campaign
    }

    fn generate_feedback(&mut self, creator: &Creator, campaign: &Campaign) -> FeedbackRecord {
        let affinity = if creator.category == campaign.category { 1.2 } else { 0.8 };
        let actual_engagement = (creator.engagement_rate * affinity * self.rng.gen_range(0.6..1.4)).max(0.05);
        let actual_roi = self.rng.gen_range(-40.0..60.0) + actual_engagement * 20.0 * affinity;
        let reach = (creator.follower_count as f64 * creator.tier().reach_rate() * self.rng.gen_range(0.5..1.5)) as u64;

        FeedbackRecord {
            campaign_id: campaign.id.clone(),
            creator_id: creator.id.clone(),
            predicted_engagement: None,
            predicted_roi: None,
            predicted_reach: None,
            actual_engagement,
            actual_roi,
            actual_reach: reach,
            engagement_error: None,
            roi_error: None,
            success: actual_roi > 0.0,
            model_version: None,
            features: HashMap::new(),
            creator_snapshot: CreatorSnapshot::capture(creator, None),
            campaign_snapshot: CampaignSnapshot::from(campaign),
            completed_at: Utc::now() - Duration::days(self.rng.gen_range(1..90)),
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("seed_generator=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("seed.json");
    let creators: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(200);
    let campaigns: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(40);
    let feedback: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(80);
    let suspicious_rate: f64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.1);

    info!(
        output = %output,
        creators,
        campaigns,
        feedback,
        suspicious_rate,
        "Generating seed data"
    );

    let mut generator = SeedGenerator::new();
    let mut rng = rand::thread_rng();
    let mut suspicious = 0;

    let creator_list: Vec<Creator> = (0..creators)
        .map(|_| {
            if rng.gen_bool(suspicious_rate.clamp(0.0, 1.0)) {
                suspicious += 1;
                generator.generate_suspicious()
            } else {
                generator.generate_organic()
            }
        })
        .collect();
    let campaign_list: Vec<Campaign> = (0..campaigns).map(|_| generator.generate_campaign()).collect();

    let mut records = HashMap::new();
    if !creator_list.is_empty() && !campaign_list.is_empty() {
        for _ in 0..feedback {
            let creator = &creator_list[rng.gen_range(0..creator_list.len())];
            let campaign = &campaign_list[rng.gen_range(0..campaign_list.len())];
            let record = generator.generate_feedback(creator, campaign);
            records.insert((record.campaign_id.clone(), record.creator_id.clone()), record);
        }
    }
    let mut feedback_list: Vec<FeedbackRecord> = records.into_values().collect();
    feedback_list.sort_by_key(|r| r.completed_at);

    let seed = SeedData {
        creators: creator_list,
        campaigns: campaign_list,
        feedback: feedback_list,
    };
    std::fs::write(output, serde_json::to_string_pretty(&seed)?)?;

    info!(
        "Completed! Wrote {} creators ({} suspicious), {} campaigns, {} feedback records to {}",
        seed.creators.len(),
        suspicious,
        seed.campaigns.len(),
        seed.feedback.len(),
        output
    );
    Ok(())
}
