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

//! # Job Runner
//!
//! Orchestrates one end-to-end ingestion attempt for one source:
//! resolve the scraper, fetch, normalize, persist, and record the
//! outcome. Errors from fetch or persist propagate to the caller so
//! the queue's retry policy can act on them; an unregistered source
//! fails fast without touching run-tracking state.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dal::{PersistResult, DAL};
use crate::error::IngestError;
use crate::models::IngestionJob;
use crate::normalizer::normalize_batch;
use crate::registry::get_scraper;
use crate::scraper::ScrapeContext;
use crate::tracker::RunTracker;

/// Outcome of one successful ingestion attempt.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub fetched: usize,
    pub normalized: usize,
    pub result: PersistResult,
    /// Rows created or updated in the store.
    pub ingested: i32,
    /// Records fetched but dropped by validation.
    pub failed: i32,
}

#[derive(Clone, Debug)]
pub struct JobRunner {
    store: Option<DAL>,
    tracker: RunTracker,
    http: reqwest::Client,
}

impl JobRunner {
    pub fn new(store: Option<DAL>, tracker: RunTracker) -> Self {
        Self {
            store,
            tracker,
            http: reqwest::Client::new(),
        }
    }

    /// Executes one ingestion attempt.
    ///
    /// The attempt fails fast with a non-retryable error when the source
    /// has no registered scraper. All other failures are surfaced after
    /// the run has been marked failed in tracking state.
    pub async fn run(&self, job: &IngestionJob) -> Result<RunSummary, IngestError> {
        let Some(scraper) = get_scraper(&job.source) else {
            return Err(IngestError::UnregisteredSource(job.source.clone()));
        };

        let run_id = job
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = Utc::now();

        self.tracker.start(&run_id, &job.source).await;
        info!(run_id = %run_id, source = %job.source, "Starting ingestion run");

        let ctx = ScrapeContext {
            run_id: run_id.clone(),
            source: job.source.clone(),
            options: job.options.clone(),
            http: self.http.clone(),
        };

        let raw = match scraper.fetch(&ctx).await {
            Ok(raw) => raw,
            Err(e) => {
                self.tracker
                    .fail(&run_id, &job.source, &e.to_string(), 0, 0)
                    .await;
                return Err(IngestError::Scrape(e));
            }
        };

        let fetched = raw.len();
        let bundles = normalize_batch(&raw);
        let normalized = bundles.len();
        let failed = fetched.saturating_sub(normalized) as i32;

        let result = match &self.store {
            Some(dal) => {
                match dal
                    .bundles()
                    .persist(&run_id, &job.source, started_at, &bundles)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        self.tracker
                            .fail(&run_id, &job.source, &e.to_string(), 0, failed)
                            .await;
                        return Err(IngestError::Storage(e));
                    }
                }
            }
            None => {
                warn!(
                    run_id = %run_id,
                    source = %job.source,
                    "No bundle store configured, skipping persistence"
                );
                PersistResult::store_disabled(bundles.len())
            }
        };

        let ingested = result.upserts() as i32;
        self.tracker
            .complete(&run_id, &job.source, ingested, failed)
            .await;

        info!(
            run_id = %run_id,
            source = %job.source,
            fetched,
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            history = result.history,
            deactivated = result.deactivated,
            failed,
            "Ingestion run finished"
        );

        Ok(RunSummary {
            run_id,
            source: job.source.clone(),
            fetched,
            normalized,
            result,
            ingested,
            failed,
        })
    }
}
