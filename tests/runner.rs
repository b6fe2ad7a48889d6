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

//! End-to-end tests for the job runner and queue worker: fetch,
//! normalize, persist, run tracking, and queue-level retry.

mod common;

use async_trait::async_trait;
use diesel::RunQueryDsl;
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

use common::test_store;
use smartbundle_ingest::error::ScrapeError;
use smartbundle_ingest::models::{IngestionJob, JobStatus, RunStatus, ScrapedBundle};
use smartbundle_ingest::queue::{EnqueueOptions, JobQueue, Worker};
use smartbundle_ingest::registry::{clear_scrapers, register_scraper};
use smartbundle_ingest::runner::JobRunner;
use smartbundle_ingest::scraper::{FixtureScraper, ScrapeContext, Scraper};
use smartbundle_ingest::tracker::RunTracker;
use smartbundle_ingest::Database;

#[derive(Debug)]
struct FailingScraper;

#[async_trait]
impl Scraper for FailingScraper {
    async fn fetch(&self, _ctx: &ScrapeContext) -> Result<Vec<ScrapedBundle>, ScrapeError> {
        Err(ScrapeError::Message("upstream returned 503".to_string()))
    }
}

/// Two valid records and one with a negative price.
fn fixture_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"id": "duo-1", "name": "Streaming Duo", "services": ["hulu", "disney plus"],
              "price": 14.99, "currency": "USD", "regions": ["US"],
              "provider": "Acme", "link": "https://acme.test/duo-1", "source": "carrier"}},
            {{"id": "duo-2", "name": "Streaming Trio", "services": ["Hulu", "ESPN+"],
              "price": 19.99, "currency": "USD", "regions": ["US"],
              "provider": "Acme", "link": "https://acme.test/duo-2", "source": "carrier"}},
            {{"id": "bad-1", "name": "Broken", "services": ["Hulu"],
              "price": -1.0, "currency": "USD", "regions": ["US"],
              "provider": "Acme", "link": "https://acme.test/bad-1"}}
        ]"#
    )
    .unwrap();
    file
}

#[tokio::test]
#[serial(registry)]
async fn run_persists_fixture_bundles_and_tracks_the_run() {
    clear_scrapers();
    let fixture = fixture_file();
    register_scraper("carrier", Arc::new(FixtureScraper::new(fixture.path())));

    let store = test_store().await;
    let dal = Some(store.dal.clone());
    let runner = JobRunner::new(dal.clone(), RunTracker::new(dal));

    let mut job = IngestionJob::new("carrier");
    job.run_id = Some("run-e2e".to_string());
    let summary = runner.run(&job).await.unwrap();

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.normalized, 2);
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.result.created, 2);

    // Service names were canonicalized before persistence.
    let row = store.dal.bundles().get("duo-1").await.unwrap().unwrap();
    assert!(row.services.contains("Disney+"));

    let run = store
        .dal
        .ingestion_runs()
        .get("run-e2e")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.bundles_ingested, 2);
    assert_eq!(run.bundles_failed, 1);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
#[serial(registry)]
async fn unregistered_source_fails_fast_without_run_records() {
    clear_scrapers();
    let store = test_store().await;
    let dal = Some(store.dal.clone());
    let runner = JobRunner::new(dal.clone(), RunTracker::new(dal));

    let err = runner
        .run(&IngestionJob::new("mobile-carrier"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No scraper registered"));
    assert_eq!(
        store
            .dal
            .ingestion_runs()
            .count_for_source("mobile-carrier")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[serial(registry)]
async fn missing_store_degrades_to_skip_counts() {
    clear_scrapers();
    let fixture = fixture_file();
    register_scraper("carrier", Arc::new(FixtureScraper::new(fixture.path())));

    let runner = JobRunner::new(None, RunTracker::disabled());
    let summary = runner.run(&IngestionJob::new("carrier")).await.unwrap();

    assert_eq!(summary.result.skipped, 2);
    assert_eq!(summary.result.created, 0);
    assert_eq!(summary.ingested, 0);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
#[serial(registry)]
async fn scraper_failure_marks_the_run_failed() {
    clear_scrapers();
    register_scraper("carrier", Arc::new(FailingScraper));

    let store = test_store().await;
    let dal = Some(store.dal.clone());
    let runner = JobRunner::new(dal.clone(), RunTracker::new(dal));

    let mut job = IngestionJob::new("carrier");
    job.run_id = Some("run-fail".to_string());
    assert!(runner.run(&job).await.is_err());

    let run = store
        .dal
        .ingestion_runs()
        .get("run-fail")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .contains("upstream returned 503"));
}

#[tokio::test]
#[serial(registry)]
async fn tracker_write_failure_does_not_fail_the_run() {
    clear_scrapers();
    let fixture = fixture_file();
    register_scraper("carrier", Arc::new(FixtureScraper::new(fixture.path())));

    let store = test_store().await;
    // Run tracking is best-effort; losing the runs table must not abort
    // the ingestion itself.
    let conn = store.database.get_connection().await.unwrap();
    conn.interact(|conn| diesel::sql_query("DROP TABLE ingestion_runs").execute(conn))
        .await
        .unwrap()
        .unwrap();
    drop(conn);

    let dal = Some(store.dal.clone());
    let runner = JobRunner::new(dal.clone(), RunTracker::new(dal));
    let summary = runner.run(&IngestionJob::new("carrier")).await.unwrap();

    assert_eq!(summary.ingested, 2);
    assert!(store.dal.bundles().get("duo-1").await.unwrap().is_some());
}

async fn open_test_queue(dir: &tempfile::TempDir) -> JobQueue {
    let db_path = dir.path().join("queue.db");
    JobQueue::open(Database::new(db_path.to_str().unwrap()))
        .await
        .unwrap()
}

#[tokio::test]
#[serial(registry)]
async fn worker_retries_then_fails_terminally() {
    clear_scrapers();
    register_scraper("carrier", Arc::new(FailingScraper));

    let dir = tempfile::tempdir().unwrap();
    let queue = open_test_queue(&dir).await;
    let runner = JobRunner::new(None, RunTracker::disabled());
    let worker = Worker::new(queue.clone(), runner, 1);

    queue
        .enqueue(
            IngestionJob::new("carrier"),
            EnqueueOptions {
                max_attempts: Some(2),
                backoff_base_ms: Some(0),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap();

    // First attempt fails and schedules an immediate retry.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    assert_eq!(queue.count_by_status(JobStatus::Ready).await.unwrap(), 1);

    // Second attempt exhausts the budget.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    assert_eq!(queue.count_by_status(JobStatus::Failed).await.unwrap(), 1);
    assert_eq!(queue.count_by_status(JobStatus::Ready).await.unwrap(), 0);
}

#[tokio::test]
#[serial(registry)]
async fn worker_completes_successful_jobs_end_to_end() {
    clear_scrapers();
    let fixture = fixture_file();
    register_scraper("carrier", Arc::new(FixtureScraper::new(fixture.path())));

    let dir = tempfile::tempdir().unwrap();
    let queue = open_test_queue(&dir).await;
    let store = test_store().await;
    let dal = Some(store.dal.clone());
    let runner = JobRunner::new(dal.clone(), RunTracker::new(dal));
    let worker = Worker::new(queue.clone(), runner, 1);

    queue
        .enqueue(IngestionJob::new("carrier"), EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(worker.poll_once().await.unwrap(), 1);

    assert_eq!(queue.count_by_status(JobStatus::Completed).await.unwrap(), 1);
    assert!(store.dal.bundles().get("duo-2").await.unwrap().is_some());
}

#[tokio::test]
#[serial(registry)]
async fn unregistered_source_fails_the_job_without_retry() {
    clear_scrapers();

    let dir = tempfile::tempdir().unwrap();
    let queue = open_test_queue(&dir).await;
    let runner = JobRunner::new(None, RunTracker::disabled());
    let worker = Worker::new(queue.clone(), runner, 1);

    queue
        .enqueue(IngestionJob::new("ghost"), EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(worker.poll_once().await.unwrap(), 1);

    assert_eq!(queue.count_by_status(JobStatus::Failed).await.unwrap(), 1);
    assert_eq!(queue.count_by_status(JobStatus::Ready).await.unwrap(), 0);
}
