/*
 *  Copyright 2025 SmartBundle Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Command surface: run one ingestion synchronously, enqueue one
//! asynchronously, list registered sources, start the scheduler, or
//! start a queue worker.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ConfigLoader, SourcesConfig};
use crate::dal::DAL;
use crate::database::Database;
use crate::error::ConfigError;
use crate::models::IngestionJob;
use crate::queue::{EnqueueOptions, JobQueue, Worker};
use crate::registry::{list_scrapers, register_scraper};
use crate::runner::JobRunner;
use crate::scheduler::Scheduler;
use crate::scraper::FixtureScraper;
use crate::tracker::RunTracker;

const QUEUE_DB_ENV: &str = "INGEST_QUEUE_DB";
const DEFAULT_QUEUE_DB: &str = "smartbundle-queue.db";
const STORE_ENV: &str = "DATABASE_URL";

#[derive(Parser)]
#[command(
    name = "smartbundle-ingest",
    version,
    about = "Ingestion pipeline for subscription bundle offers",
    long_about = "Harvests subscription-bundle offers from configured sources, normalizes \
                  them, and merges them into the canonical bundle store with price history \
                  and stale-offer deactivation"
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the source configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute one ingestion run for a source synchronously
    Run {
        /// Source key to ingest
        source: String,

        /// Job options (KEY=VALUE format, JSON values accepted)
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Run identifier; generated when absent
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Enqueue one ingestion job and return immediately
    Enqueue {
        /// Source key to ingest
        source: String,

        /// Job options (KEY=VALUE format, JSON values accepted)
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Override the default attempt limit
        #[arg(long)]
        max_attempts: Option<i32>,
    },
    /// Print registered source keys
    List,
    /// Start the cron scheduler
    Schedule,
    /// Start a queue worker
    Work {
        /// Maximum jobs processed concurrently
        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,
    },
}

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            ref source,
            ref options,
            ref run_id,
        } => run_source(cli.config.as_deref(), source, options, run_id.clone()).await,
        Commands::Enqueue {
            ref source,
            ref options,
            max_attempts,
        } => enqueue_source(cli.config.as_deref(), source, options, max_attempts).await,
        Commands::List => list_sources(cli.config.as_deref()),
        Commands::Schedule => schedule(cli.config.as_deref()).await,
        Commands::Work { max_concurrent } => work(cli.config.as_deref(), max_concurrent).await,
    }
}

async fn run_source(
    config_path: Option<&Path>,
    source: &str,
    raw_options: &[String],
    run_id: Option<String>,
) -> Result<()> {
    let config = load_config_lenient(config_path)?;
    register_configured_scrapers(&config);

    let mut job = IngestionJob::new(source);
    job.run_id = run_id;
    job.options = merged_options(&config, source, raw_options)?;

    let store = open_store().await?;
    let tracker = RunTracker::new(store.clone());
    let runner = JobRunner::new(store, tracker);

    let summary = runner.run(&job).await?;
    println!(
        "run {} source={} fetched={} created={} updated={} skipped={} history={} deactivated={} failed={}",
        summary.run_id,
        summary.source,
        summary.fetched,
        summary.result.created,
        summary.result.updated,
        summary.result.skipped,
        summary.result.history,
        summary.result.deactivated,
        summary.failed,
    );
    Ok(())
}

async fn enqueue_source(
    config_path: Option<&Path>,
    source: &str,
    raw_options: &[String],
    max_attempts: Option<i32>,
) -> Result<()> {
    let config = load_config_lenient(config_path)?;

    let mut job = IngestionJob::new(source);
    job.options = merged_options(&config, source, raw_options)?;

    let queue = open_queue().await?;
    let job_id = queue
        .enqueue(
            job,
            EnqueueOptions {
                max_attempts,
                ..EnqueueOptions::default()
            },
        )
        .await?;
    println!("enqueued {}", job_id);
    Ok(())
}

fn list_sources(config_path: Option<&Path>) -> Result<()> {
    let config = load_config_lenient(config_path)?;
    register_configured_scrapers(&config);
    for name in list_scrapers() {
        println!("{}", name);
    }
    Ok(())
}

async fn schedule(config_path: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::new()
        .load(config_path)
        .context("Failed to load source configuration")?;
    register_configured_scrapers(&config);

    let queue = open_queue().await?;
    let scheduler = Scheduler::new(queue, &config);

    let shutdown = shutdown_signal();
    scheduler.run(shutdown).await;
    Ok(())
}

async fn work(config_path: Option<&Path>, max_concurrent: usize) -> Result<()> {
    let config = load_config_lenient(config_path)?;
    register_configured_scrapers(&config);

    let queue = open_queue().await?;
    let store = open_store().await?;
    let tracker = RunTracker::new(store.clone());
    let runner = JobRunner::new(store, tracker);
    let worker = Worker::new(queue, runner, max_concurrent);

    let shutdown = shutdown_signal();
    worker.run(shutdown).await;
    Ok(())
}

/// Loads configuration, treating a missing file as an empty configuration.
/// Only the scheduler requires the file to exist.
fn load_config_lenient(config_path: Option<&Path>) -> Result<SourcesConfig> {
    match ConfigLoader::new().load(config_path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound) => Ok(SourcesConfig::default()),
        Err(e) => Err(e).context("Failed to load source configuration"),
    }
}

/// Registers the built-in file-backed scraper for every configured source
/// that points at a fixture file.
fn register_configured_scrapers(config: &SourcesConfig) {
    for (name, source) in &config.sources {
        if let Some(path) = source.options.get("fixture").and_then(|v| v.as_str()) {
            register_scraper(name.clone(), Arc::new(FixtureScraper::new(path)));
        }
    }
    if config.sources.is_empty() {
        warn!("No sources configured");
    }
}

/// Config-file options overlaid with CLI `-o KEY=VALUE` overrides.
fn merged_options(
    config: &SourcesConfig,
    source: &str,
    raw_options: &[String],
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut options = config
        .sources
        .get(source)
        .map(|s| s.options.clone())
        .unwrap_or_default();
    for raw in raw_options {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid option {:?}, expected KEY=VALUE", raw))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        options.insert(key.to_string(), value);
    }
    Ok(options)
}

/// The bundle store is optional: without `DATABASE_URL` the pipeline runs
/// in ingestion-without-persistence mode.
async fn open_store() -> Result<Option<DAL>> {
    match Database::from_env(STORE_ENV) {
        None => {
            info!("{} not set, running without a bundle store", STORE_ENV);
            Ok(None)
        }
        Some(database) => {
            database
                .run_migrations()
                .await
                .context("Failed to migrate bundle store")?;
            Ok(Some(DAL::new(database)))
        }
    }
}

async fn open_queue() -> Result<JobQueue> {
    let url = std::env::var(QUEUE_DB_ENV).unwrap_or_else(|_| DEFAULT_QUEUE_DB.to_string());
    let queue = JobQueue::open(Database::new(&url))
        .await
        .context("Failed to open job queue store")?;
    Ok(queue)
}

/// Flips a watch channel to true on ctrl-c.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = tx.send(true);
        }
    });
    rx
}
