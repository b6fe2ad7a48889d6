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

//! # Job Queue
//!
//! Durable, at-least-once work queue backed by its own SQLite database,
//! decoupling trigger time from execution time. Jobs carry their retry
//! policy (attempt limit, exponential backoff base) and per-outcome
//! retention limits; claiming is atomic so multiple workers can pull
//! jobs concurrently without double-execution.

mod worker;

pub use worker::Worker;

use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dal::{ClaimedJob, NewJobSpec, DAL};
use crate::database::Database;
use crate::error::QueueError;
use crate::models::{IngestionJob, JobStatus};

/// Default retry and retention policy, applied when the caller does not
/// override a field.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: i32 = 1_000;
pub const DEFAULT_RETAIN_COMPLETED: i32 = 200;
pub const DEFAULT_RETAIN_FAILED: i32 = 500;

const READINESS_ATTEMPTS: u32 = 5;
const READINESS_DELAY: Duration = Duration::from_millis(200);

/// Per-enqueue overrides of the default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub max_attempts: Option<i32>,
    pub backoff_base_ms: Option<i32>,
    pub retain_completed: Option<i32>,
    pub retain_failed: Option<i32>,
}

/// Handle to the queue store, constructed once at startup and injected
/// into the scheduler and workers.
#[derive(Clone, Debug)]
pub struct JobQueue {
    dal: DAL,
}

impl JobQueue {
    /// Opens the queue store, running migrations and verifying the store
    /// answers within a bounded number of readiness checks.
    pub async fn open(database: Database) -> Result<Self, QueueError> {
        database.run_migrations().await?;

        let mut last_error = String::new();
        for attempt in 1..=READINESS_ATTEMPTS {
            match database.ping().await {
                Ok(()) => {
                    debug!(attempt, "Queue store ready");
                    let dal = DAL::new(database);
                    return Ok(Self { dal });
                }
                Err(e) => {
                    last_error = e.to_string();
                    tokio::time::sleep(READINESS_DELAY).await;
                }
            }
        }
        Err(QueueError::NotReady {
            attempts: READINESS_ATTEMPTS,
            message: last_error,
        })
    }

    /// Adds a job, applying default policy for any field the caller left
    /// unset. Returns the queue-assigned job id.
    pub async fn enqueue(
        &self,
        job: IngestionJob,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let spec = NewJobSpec {
            job,
            max_attempts: options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            backoff_base_ms: options.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS),
            retain_completed: options.retain_completed.unwrap_or(DEFAULT_RETAIN_COMPLETED),
            retain_failed: options.retain_failed.unwrap_or(DEFAULT_RETAIN_FAILED),
        };
        let source = spec.job.source.clone();
        let id = self.dal.jobs().enqueue(spec).await?;
        info!(job_id = %id, source = %source, "Enqueued ingestion job");
        Ok(id)
    }

    /// Claims up to `limit` due jobs for execution.
    pub async fn claim(&self, limit: usize) -> Result<Vec<ClaimedJob>, QueueError> {
        Ok(self.dal.jobs().claim(limit).await?)
    }

    /// Returns jobs that have been running longer than `older_than` to the
    /// ready state, recovering work orphaned by a crashed worker process.
    pub async fn reclaim_stalled(&self, older_than: Duration) -> Result<usize, QueueError> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let reclaimed = self.dal.jobs().reclaim_stalled(cutoff).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "Returned stalled jobs to the queue");
        }
        Ok(reclaimed)
    }

    /// Returns a failed attempt to the ready state with a retry time
    /// computed from the job's exponential backoff policy.
    pub async fn schedule_retry(
        &self,
        job: &ClaimedJob,
        error_message: &str,
    ) -> Result<(), QueueError> {
        let delay = backoff_delay(job.backoff_base_ms, job.attempt);
        let retry_at = chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self.dal
            .jobs()
            .schedule_retry(job.id, retry_at, error_message)
            .await?;
        Ok(())
    }

    /// Marks a job done, pruning completed jobs beyond its retention limit.
    pub async fn mark_completed(&self, job: &ClaimedJob) -> Result<(), QueueError> {
        self.dal
            .jobs()
            .mark_completed(job.id, job.retain_completed)
            .await?;
        Ok(())
    }

    /// Terminally fails a job, retaining a bounded number of failed jobs
    /// for inspection.
    pub async fn mark_failed(
        &self,
        job: &ClaimedJob,
        error_message: &str,
    ) -> Result<(), QueueError> {
        self.dal
            .jobs()
            .mark_failed(job.id, error_message, job.retain_failed)
            .await?;
        Ok(())
    }

    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64, QueueError> {
        Ok(self.dal.jobs().count_by_status(status).await?)
    }

    /// Direct access to the queue's storage layer.
    pub fn dal(&self) -> &DAL {
        &self.dal
    }
}

/// Exponential backoff: `base * 2^(attempt-1)` for the attempt that just
/// failed, so the first retry waits one base interval.
pub fn backoff_delay(base_ms: i32, attempt: i32) -> Duration {
    let exponent = attempt.saturating_sub(1).clamp(0, 16) as u32;
    let millis = (base_ms.max(0) as u64).saturating_mul(1u64 << exponent);
    Duration::from_millis(millis)
}
