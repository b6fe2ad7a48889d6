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

//! Queue worker: polls for due jobs, runs them concurrently up to a
//! permit limit, and applies the per-job retry policy on failure.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::dal::ClaimedJob;
use crate::error::IngestError;
use crate::queue::JobQueue;
use crate::runner::JobRunner;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Worker {
    queue: JobQueue,
    runner: JobRunner,
    poll_interval: Duration,
    stall_timeout: Duration,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(queue: JobQueue, runner: JobRunner, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            queue,
            runner,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long a claimed job may stay running before the poll loop hands
    /// it back to the queue as orphaned.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Claims due jobs and runs each to completion before returning.
    ///
    /// Used by the synchronous paths and tests; the polling loop in
    /// [`Worker::run`] dispatches the same way but detached.
    pub async fn poll_once(&self) -> Result<usize, crate::error::QueueError> {
        let jobs = self.queue.claim(self.permits.available_permits().max(1)).await?;
        let count = jobs.len();
        for job in jobs {
            process_job(&self.queue, &self.runner, job).await;
        }
        Ok(count)
    }

    /// Polls until the shutdown signal flips, dispatching each claimed job
    /// onto its own task so a slow source cannot stall the others.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_due_jobs().await {
                        error!(error = %e, "Failed to claim jobs");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Worker shutting down");
                        break;
                    }
                }
            }
        }
        // Drain: wait for in-flight jobs to finish.
        let _ = self.permits.acquire_many(self.max_concurrent as u32).await;
    }

    async fn dispatch_due_jobs(&self) -> Result<(), crate::error::QueueError> {
        self.queue.reclaim_stalled(self.stall_timeout).await?;
        let available = self.permits.available_permits();
        if available == 0 {
            return Ok(());
        }
        let jobs = self.queue.claim(available).await?;
        for job in jobs {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            };
            let queue = self.queue.clone();
            let runner = self.runner.clone();
            tokio::spawn(async move {
                process_job(&queue, &runner, job).await;
                drop(permit);
            });
        }
        Ok(())
    }
}

/// Runs one claimed job and settles its queue state.
///
/// An unregistered source is a configuration error and fails the job
/// terminally; every other error consumes an attempt and either schedules
/// a backoff retry or, with the budget spent, fails the job terminally.
async fn process_job(queue: &JobQueue, runner: &JobRunner, job: ClaimedJob) {
    debug!(
        job_id = %job.id,
        source = %job.job.source,
        attempt = job.attempt,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    match runner.run(&job.job).await {
        Ok(summary) => {
            if let Err(e) = queue.mark_completed(&job).await {
                error!(job_id = %job.id, error = %e, "Failed to mark job completed");
            }
            debug!(
                job_id = %job.id,
                run_id = %summary.run_id,
                ingested = summary.ingested,
                "Job completed"
            );
        }
        Err(e @ IngestError::UnregisteredSource(_)) => {
            warn!(job_id = %job.id, error = %e, "Job failed with configuration error, not retrying");
            if let Err(mark_err) = queue.mark_failed(&job, &e.to_string()).await {
                error!(job_id = %job.id, error = %mark_err, "Failed to mark job failed");
            }
        }
        Err(e) => {
            if job.attempt >= job.max_attempts {
                warn!(
                    job_id = %job.id,
                    source = %job.job.source,
                    attempt = job.attempt,
                    error = %e,
                    "Job exhausted its attempts, failing terminally"
                );
                if let Err(mark_err) = queue.mark_failed(&job, &e.to_string()).await {
                    error!(job_id = %job.id, error = %mark_err, "Failed to mark job failed");
                }
            } else {
                warn!(
                    job_id = %job.id,
                    source = %job.job.source,
                    attempt = job.attempt,
                    error = %e,
                    "Job failed, scheduling retry"
                );
                if let Err(retry_err) = queue.schedule_retry(&job, &e.to_string()).await {
                    error!(job_id = %job.id, error = %retry_err, "Failed to schedule retry");
                }
            }
        }
    }
}
