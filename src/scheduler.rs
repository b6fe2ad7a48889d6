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

//! # Scheduler
//!
//! Reads the source configuration once at startup and holds one timer
//! per active source. Each tick enqueues a job; a failed enqueue is
//! logged and the timer keeps ticking, so one source can never crash
//! the scheduler or starve the others. Misconfigured sources (missing
//! schedule, bad cron expression, unknown timezone) are skipped with a
//! warning at startup.

use chrono::Utc;
use chrono_tz::Tz;
use croner::Cron;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::SourcesConfig;
use crate::models::IngestionJob;
use crate::queue::{EnqueueOptions, JobQueue};

/// A source that survived startup filtering, with its parsed trigger.
#[derive(Debug, Clone)]
pub struct PlannedSource {
    pub name: String,
    pub expression: String,
    pub cron: Cron,
    pub timezone: Tz,
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Filters the configuration down to schedulable sources.
///
/// Inactive sources are dropped silently; sources missing a schedule or
/// carrying an unparseable cron expression or timezone are dropped with
/// a warning.
pub fn plan_sources(config: &SourcesConfig) -> Vec<PlannedSource> {
    let mut planned = Vec::new();

    for (name, source) in &config.sources {
        if !source.active {
            info!(source = %name, "Source marked inactive, skipping");
            continue;
        }

        let Some(expression) = source.schedule.as_deref() else {
            warn!(source = %name, "Source has no cron schedule, skipping");
            continue;
        };

        let cron = match Cron::new(expression).with_seconds_optional().parse() {
            Ok(cron) => cron,
            Err(e) => {
                warn!(source = %name, expression = %expression, error = %e, "Invalid cron expression, skipping");
                continue;
            }
        };

        let timezone = match source.timezone.as_deref() {
            None => chrono_tz::UTC,
            Some(tz_name) => match tz_name.parse::<Tz>() {
                Ok(tz) => tz,
                Err(_) => {
                    warn!(source = %name, timezone = %tz_name, "Unknown timezone, skipping");
                    continue;
                }
            },
        };

        planned.push(PlannedSource {
            name: name.clone(),
            expression: expression.to_string(),
            cron,
            timezone,
            options: source.options.clone(),
        });
    }

    planned
}

pub struct Scheduler {
    queue: JobQueue,
    planned: Vec<PlannedSource>,
}

impl Scheduler {
    /// Builds a scheduler from an already-loaded configuration.
    pub fn new(queue: JobQueue, config: &SourcesConfig) -> Self {
        let planned = plan_sources(config);
        Self { queue, planned }
    }

    pub fn planned_sources(&self) -> &[PlannedSource] {
        &self.planned
    }

    /// Runs all source timers until the shutdown signal flips.
    ///
    /// With nothing to schedule the scheduler stays alive but idle, so
    /// an empty or fully-filtered configuration is not an error.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        if self.planned.is_empty() {
            warn!("No schedulable sources configured, scheduler is idle");
            wait_for_shutdown(shutdown).await;
            return;
        }

        let mut handles = Vec::with_capacity(self.planned.len());
        for source in &self.planned {
            info!(source = %source.name, schedule = %source.expression, timezone = %source.timezone, "Scheduling source");
            let queue = self.queue.clone();
            let source = source.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(source_loop(queue, source, shutdown)));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// One source's timer loop: sleep until the next cron occurrence, then
/// enqueue. Enqueue failures are logged and the loop continues.
async fn source_loop(queue: JobQueue, source: PlannedSource, mut shutdown: watch::Receiver<bool>) {
    loop {
        let now = Utc::now().with_timezone(&source.timezone);
        let next = match source.cron.find_next_occurrence(&now, false) {
            Ok(next) => next,
            Err(e) => {
                error!(source = %source.name, error = %e, "No next cron occurrence, stopping timer");
                return;
            }
        };

        let wait = (next - now)
            .to_std()
            .unwrap_or_else(|_| Duration::from_secs(0));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let mut job = IngestionJob::new(source.name.clone());
                job.options = source.options.clone();
                match queue.enqueue(job, EnqueueOptions::default()).await {
                    Ok(job_id) => {
                        info!(source = %source.name, job_id = %job_id, "Enqueued scheduled job");
                    }
                    Err(e) => {
                        error!(source = %source.name, error = %e, "Failed to enqueue scheduled job");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(source = %source.name, "Stopping source timer");
                    return;
                }
            }
        }
    }
}
