//! Creator Scoring Engine - Scheduler Entry Point
//!
//! Loads configuration and an optional seed file into the in-memory store,
//! then runs the weekly and monthly jobs on their intervals until Ctrl-C.

use anyhow::{Context, Result};
use creator_scoring_engine::{
    config::LoggingConfig,
    metrics::MetricsReporter,
    store::{MemoryStore, SeedData, Store},
    EngineConfig, ScoringEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level))
        .add_directive(format!("creator_scoring_engine={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (path can be passed as the first argument)
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_path(&path)?,
        None => EngineConfig::load()?,
    };
    init_logging(&config.logging)?;
    info!("Starting Creator Scoring Engine");

    let store = match &config.store.seed_path {
        Some(path) => {
            let seed = SeedData::load(path).with_context(|| format!("Failed to load seed {}", path))?;
            Arc::new(MemoryStore::from_seed(seed).await)
        }
        None => {
            warn!("No seed file configured, starting with an empty store");
            Arc::new(MemoryStore::new())
        }
    };
    let store: Arc<dyn Store> = store;

    info!(
        page_size = config.scheduler.page_size,
        weekly_secs = config.scheduler.weekly_interval_secs,
        monthly_secs = config.scheduler.monthly_interval_secs,
        model = %config.prediction.model_name,
        "Configuration loaded"
    );

    let engine = Arc::new(ScoringEngine::from_config(store, config.clone())?);

    // Periodic metrics summary
    let reporter = MetricsReporter::new(engine.metrics(), config.scheduler.report_interval_secs);
    tokio::spawn(reporter.start());

    // Weekly jobs: CQI, fraud, audience, embeddings
    let weekly_engine = engine.clone();
    let weekly_secs = config.scheduler.weekly_interval_secs.max(1);
    let weekly = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(weekly_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = weekly_engine.run_weekly_jobs().await;
            let failed = report.jobs.iter().filter(|j| j.error.is_some()).count();
            info!(jobs = report.jobs.len(), failed, skipped = ?report.skipped, "Weekly run complete");
        }
    });

    // Monthly jobs: retraining
    let monthly_engine = engine.clone();
    let monthly_secs = config.scheduler.monthly_interval_secs.max(1);
    let monthly = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(monthly_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = monthly_engine.run_monthly_jobs().await;
            if let Some(retraining) = &report.retraining {
                for line in &retraining.log {
                    info!("{}", line);
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Engine shutting down...");
    weekly.abort();
    monthly.abort();
    engine.metrics().print_summary();

    Ok(())
}
