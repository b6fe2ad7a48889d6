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

//! # SmartBundle Ingest
//!
//! Ingestion pipeline for subscription-bundle offers. Sources are
//! scraped on cron schedules, their records normalized and validated,
//! then merged into a canonical SQLite store inside one transaction per
//! run, with price history capture and deactivation of offers that
//! disappeared from their source.
//!
//! The moving parts, in data-flow order:
//!
//! - [`scheduler`] reads the source configuration and enqueues jobs on
//!   each cron tick.
//! - [`queue`] is a durable, at-least-once job queue with per-job retry
//!   and retention policy; its [`queue::Worker`] pulls due jobs.
//! - [`runner`] executes one job: resolve the scraper through
//!   [`registry`], fetch, normalize through [`normalizer`], persist.
//! - [`dal`] owns the transactional upsert/history/deactivation logic
//!   and the queue's storage.
//! - [`tracker`] records best-effort lifecycle rows for each run.
//!
//! A minimal embedding:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smartbundle_ingest::models::IngestionJob;
//! use smartbundle_ingest::registry::register_scraper;
//! use smartbundle_ingest::runner::JobRunner;
//! use smartbundle_ingest::scraper::FixtureScraper;
//! use smartbundle_ingest::tracker::RunTracker;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! register_scraper("demo", Arc::new(FixtureScraper::new("bundles.json")));
//! let runner = JobRunner::new(None, RunTracker::disabled());
//! let summary = runner.run(&IngestionJob::new("demo")).await?;
//! println!("ingested {} bundles", summary.ingested);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod scraper;
pub mod tracker;

pub use config::{ConfigLoader, SourceConfig, SourcesConfig};
pub use dal::{PersistResult, DAL};
pub use database::Database;
pub use error::{ConfigError, IngestError, QueueError, ScrapeError, StorageError};
pub use models::{Bundle, IngestionJob, IngestionRun, RunStatus, ScrapedBundle};
pub use queue::{EnqueueOptions, JobQueue, Worker};
pub use runner::{JobRunner, RunSummary};
pub use scheduler::Scheduler;
pub use scraper::{FixtureScraper, ScrapeContext, Scraper};
pub use tracker::RunTracker;
