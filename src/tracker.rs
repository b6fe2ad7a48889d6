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

//! # Run Tracker
//!
//! Best-effort lifecycle records for ingestion runs. Tracking is
//! observability, not correctness: every write failure is logged and
//! swallowed so tracking can neither fail a successful run nor mask a
//! persistence failure. Without a configured store the tracker is a no-op.

use tracing::{debug, warn};

use crate::dal::DAL;

#[derive(Clone)]
pub struct RunTracker {
    dal: Option<DAL>,
}

impl RunTracker {
    pub fn new(dal: Option<DAL>) -> Self {
        Self { dal }
    }

    pub fn disabled() -> Self {
        Self { dal: None }
    }

    /// Upserts the run row to `running` with counters reset.
    pub async fn start(&self, run_id: &str, source: &str) {
        let Some(dal) = &self.dal else {
            debug!(run_id = %run_id, "Run tracking disabled, skipping start record");
            return;
        };
        if let Err(e) = dal.ingestion_runs().start(run_id, source).await {
            warn!(run_id = %run_id, source = %source, error = %e, "Failed to record run start");
        }
    }

    /// Marks the run successful with final counts.
    pub async fn complete(&self, run_id: &str, source: &str, ingested: i32, failed: i32) {
        let Some(dal) = &self.dal else {
            return;
        };
        if let Err(e) = dal.ingestion_runs().complete(run_id, ingested, failed).await {
            warn!(run_id = %run_id, source = %source, error = %e, "Failed to record run completion");
        }
    }

    /// Marks the run failed, recording the error's textual message.
    pub async fn fail(&self, run_id: &str, source: &str, error: &str, ingested: i32, failed: i32) {
        let Some(dal) = &self.dal else {
            return;
        };
        if let Err(e) = dal
            .ingestion_runs()
            .fail(run_id, error, ingested, failed)
            .await
        {
            warn!(run_id = %run_id, source = %source, error = %e, "Failed to record run failure");
        }
    }
}

impl std::fmt::Debug for RunTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunTracker")
            .field("enabled", &self.dal.is_some())
            .finish()
    }
}
