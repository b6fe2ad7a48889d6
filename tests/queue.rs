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

//! Integration tests for the durable job queue: claiming, retry gating,
//! terminal states, and retention pruning.

use chrono::{Duration, Utc};
use tempfile::TempDir;

use smartbundle_ingest::database::Database;
use smartbundle_ingest::models::{IngestionJob, JobStatus};
use smartbundle_ingest::queue::{EnqueueOptions, JobQueue};

struct TestQueue {
    queue: JobQueue,
    _dir: TempDir,
}

async fn test_queue() -> TestQueue {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("queue.db");
    let database = Database::new(db_path.to_str().expect("utf-8 path"));
    let queue = JobQueue::open(database).await.expect("open queue");
    TestQueue { queue, _dir: dir }
}

#[tokio::test]
async fn enqueue_then_claim_hands_out_the_job_once() {
    let q = test_queue().await;
    let job_id = q
        .queue
        .enqueue(IngestionJob::new("carrier"), EnqueueOptions::default())
        .await
        .unwrap();

    let claimed = q.queue.claim(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, job_id);
    assert_eq!(claimed[0].job.source, "carrier");
    assert_eq!(claimed[0].attempt, 1);
    assert_eq!(claimed[0].max_attempts, 3);

    // The job is now running; a second claim must not hand it out again.
    assert!(q.queue.claim(10).await.unwrap().is_empty());
    assert_eq!(
        q.queue.count_by_status(JobStatus::Running).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn claim_respects_the_limit_and_creation_order() {
    let q = test_queue().await;
    for source in ["alpha", "beta", "gamma"] {
        q.queue
            .enqueue(IngestionJob::new(source), EnqueueOptions::default())
            .await
            .unwrap();
    }

    let first = q.queue.claim(2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].job.source, "alpha");
    assert_eq!(first[1].job.source, "beta");

    let rest = q.queue.claim(2).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].job.source, "gamma");
}

#[tokio::test]
async fn retry_gate_holds_future_jobs_back() {
    let q = test_queue().await;
    q.queue
        .enqueue(IngestionJob::new("carrier"), EnqueueOptions::default())
        .await
        .unwrap();
    let job = q.queue.claim(1).await.unwrap().remove(0);

    q.queue
        .dal()
        .jobs()
        .schedule_retry(job.id, Utc::now() + Duration::hours(1), "transient outage")
        .await
        .unwrap();

    // Ready again but gated an hour out.
    assert_eq!(q.queue.count_by_status(JobStatus::Ready).await.unwrap(), 1);
    assert!(q.queue.claim(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn stalled_running_jobs_are_reclaimed_and_claimable_again() {
    let q = test_queue().await;
    q.queue
        .enqueue(IngestionJob::new("carrier"), EnqueueOptions::default())
        .await
        .unwrap();
    let job = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(job.attempt, 1);

    // A generous timeout leaves the freshly claimed job alone.
    assert_eq!(
        q.queue
            .reclaim_stalled(std::time::Duration::from_secs(3600))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        q.queue.count_by_status(JobStatus::Running).await.unwrap(),
        1
    );

    // Once the job has been running past the timeout it goes back to
    // ready and the next claim spends a fresh attempt.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(
        q.queue
            .reclaim_stalled(std::time::Duration::from_millis(10))
            .await
            .unwrap(),
        1
    );
    assert_eq!(q.queue.count_by_status(JobStatus::Ready).await.unwrap(), 1);

    let reclaimed = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempt, 2);
}

#[tokio::test]
async fn stalled_job_with_no_attempts_left_fails_terminally() {
    let q = test_queue().await;
    q.queue
        .enqueue(
            IngestionJob::new("carrier"),
            EnqueueOptions {
                max_attempts: Some(1),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap();
    let job = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(job.attempt, job.max_attempts);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(
        q.queue
            .reclaim_stalled(std::time::Duration::from_millis(10))
            .await
            .unwrap(),
        0
    );
    assert_eq!(q.queue.count_by_status(JobStatus::Failed).await.unwrap(), 1);

    let row = q.queue.dal().jobs().get(job.id).await.unwrap().unwrap();
    assert!(row.last_error.as_deref().unwrap().contains("stalled"));
}

#[tokio::test]
async fn elapsed_retry_is_claimable_with_bumped_attempt() {
    let q = test_queue().await;
    q.queue
        .enqueue(IngestionJob::new("carrier"), EnqueueOptions::default())
        .await
        .unwrap();
    let job = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(job.attempt, 1);

    q.queue
        .dal()
        .jobs()
        .schedule_retry(job.id, Utc::now() - Duration::seconds(1), "transient outage")
        .await
        .unwrap();

    let retried = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(retried.id, job.id);
    assert_eq!(retried.attempt, 2);
}

#[tokio::test]
async fn completed_jobs_are_pruned_beyond_retention() {
    let q = test_queue().await;
    let options = EnqueueOptions {
        retain_completed: Some(2),
        ..EnqueueOptions::default()
    };

    for _ in 0..4 {
        q.queue
            .enqueue(IngestionJob::new("carrier"), options)
            .await
            .unwrap();
        let job = q.queue.claim(1).await.unwrap().remove(0);
        q.queue.mark_completed(&job).await.unwrap();
    }

    assert_eq!(
        q.queue.count_by_status(JobStatus::Completed).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn failed_jobs_keep_their_last_error() {
    let q = test_queue().await;
    q.queue
        .enqueue(IngestionJob::new("carrier"), EnqueueOptions::default())
        .await
        .unwrap();
    let job = q.queue.claim(1).await.unwrap().remove(0);
    q.queue
        .mark_failed(&job, "scraper exploded")
        .await
        .unwrap();

    assert_eq!(q.queue.count_by_status(JobStatus::Failed).await.unwrap(), 1);
    let row = q
        .queue
        .dal()
        .jobs()
        .get(job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.last_error.as_deref(), Some("scraper exploded"));
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn job_options_round_trip_through_the_queue() {
    let q = test_queue().await;
    let mut job = IngestionJob::new("carrier");
    job.options
        .insert("fixture".to_string(), serde_json::json!("deals.json"));
    job.run_id = Some("run-42".to_string());
    q.queue.enqueue(job, EnqueueOptions::default()).await.unwrap();

    let claimed = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(
        claimed.job.options.get("fixture"),
        Some(&serde_json::json!("deals.json"))
    );
    assert_eq!(claimed.job.run_id.as_deref(), Some("run-42"));
}

#[tokio::test]
async fn enqueue_overrides_apply_per_field() {
    let q = test_queue().await;
    q.queue
        .enqueue(
            IngestionJob::new("carrier"),
            EnqueueOptions {
                max_attempts: Some(5),
                ..EnqueueOptions::default()
            },
        )
        .await
        .unwrap();

    let job = q.queue.claim(1).await.unwrap().remove(0);
    assert_eq!(job.max_attempts, 5);
    assert_eq!(job.backoff_base_ms, 1_000);
    assert_eq!(job.retain_completed, 200);
    assert_eq!(job.retain_failed, 500);
}
