//! Job and scoring statistics for the scoring engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

use crate::batch::BatchSummary;

/// Metrics collector for scheduled jobs and match scoring
pub struct JobMetrics {
    /// Job invocations, successful or not
    pub jobs_run: AtomicU64,
    /// Job invocations that returned an error
    pub job_failures: AtomicU64,
    /// Entities processed across all batch jobs
    pub items_processed: AtomicU64,
    /// Entities that failed inside batch jobs
    pub item_errors: AtomicU64,
    /// Composite match scores computed
    pub matches_scored: AtomicU64,
    /// Durations per job name (in milliseconds)
    job_durations: RwLock<HashMap<String, Vec<u64>>>,
    /// Composite score distribution buckets (0-10, 10-20, ...)
    match_buckets: RwLock<[u64; 10]>,
    /// CQI distribution buckets
    cqi_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

fn bucket(score: f64) -> usize {
    (score.clamp(0.0, 100.0) / 10.0).min(9.0) as usize
}

impl JobMetrics {
    pub fn new() -> Self {
        Self {
            jobs_run: AtomicU64::new(0),
            job_failures: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            item_errors: AtomicU64::new(0),
            matches_scored: AtomicU64::new(0),
            job_durations: RwLock::new(HashMap::new()),
            match_buckets: RwLock::new([0; 10]),
            cqi_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a finished job; `summary` is `None` when the job failed outright
    pub fn record_job(&self, job: &str, duration: Duration, summary: Option<&BatchSummary>) {
        self.jobs_run.fetch_add(1, Ordering::Relaxed);
        match summary {
            Some(summary) => {
                self.items_processed
                    .fetch_add(summary.processed as u64, Ordering::Relaxed);
                self.item_errors.fetch_add(summary.errors as u64, Ordering::Relaxed);
            }
            None => {
                self.job_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut durations) = self.job_durations.write() {
            let times = durations.entry(job.to_string()).or_default();
            times.push(duration.as_millis() as u64);
            // Keep only the last 100 runs per job
            if times.len() > 100 {
                times.drain(0..50);
            }
        }
    }

    pub fn record_match_score(&self, score: f64) {
        self.matches_scored.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut buckets) = self.match_buckets.write() {
            buckets[bucket(score)] += 1;
        }
    }

    pub fn record_cqi(&self, score: f64) {
        if let Ok(mut buckets) = self.cqi_buckets.write() {
            buckets[bucket(score)] += 1;
        }
    }

    pub fn get_job_stats(&self) -> HashMap<String, JobStats> {
        let Ok(durations) = self.job_durations.read() else {
            return HashMap::new();
        };
        durations
            .iter()
            .filter(|(_, times)| !times.is_empty())
            .map(|(job, times)| {
                let sum: u64 = times.iter().sum();
                (
                    job.clone(),
                    JobStats {
                        runs: times.len() as u64,
                        mean_ms: sum / times.len() as u64,
                        last_ms: times.last().copied().unwrap_or(0),
                        max_ms: times.iter().copied().max().unwrap_or(0),
                    },
                )
            })
            .collect()
    }

    pub fn get_match_distribution(&self) -> [u64; 10] {
        self.match_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    pub fn get_cqi_distribution(&self) -> [u64; 10] {
        self.cqi_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let jobs = self.jobs_run.load(Ordering::Relaxed);
        let failures = self.job_failures.load(Ordering::Relaxed);
        let processed = self.items_processed.load(Ordering::Relaxed);
        let errors = self.item_errors.load(Ordering::Relaxed);
        let matches = self.matches_scored.load(Ordering::Relaxed);

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            CREATOR SCORING ENGINE - METRICS SUMMARY          ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Jobs Run: {:>8}  │  Failed: {:>6}  │  Uptime: {:>8}s  ║",
            jobs,
            failures,
            self.uptime().as_secs()
        );
        info!(
            "║ Items Processed: {:>8}  │  Item Errors: {:>8}          ║",
            processed, errors
        );
        info!("║ Match Scores Computed: {:>8}                              ║", matches);
        info!("╠══════════════════════════════════════════════════════════════╣");

        let mut stats: Vec<(String, JobStats)> = self.get_job_stats().into_iter().collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        for (job, s) in &stats {
            info!(
                "║   {:12}: runs={:>4} mean={:>7}ms last={:>7}ms max={:>7}ms",
                job, s.runs, s.mean_ms, s.last_ms, s.max_ms
            );
        }

        for (title, dist) in [
            ("CQI Distribution", self.get_cqi_distribution()),
            ("Match Score Distribution", self.get_match_distribution()),
        ] {
            let total: u64 = dist.iter().sum();
            if total == 0 {
                continue;
            }
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ {}:", title);
            for (i, &count) in dist.iter().enumerate() {
                let pct = count as f64 / total as f64 * 100.0;
                let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
                info!(
                    "║   {:>3}-{:<3}: {:>6} ({:>5.1}%) {}",
                    i * 10,
                    (i + 1) * 10,
                    count,
                    pct,
                    bar
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JobStats {
    pub runs: u64,
    pub mean_ms: u64,
    pub last_ms: u64,
    pub max_ms: u64,
}

/// Prints a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<JobMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<JobMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
