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

//! Queue job payload and lifecycle status.

use serde::{Deserialize, Serialize};

/// A request to run one ingestion attempt for one source.
///
/// `run_id` is usually absent and generated by the runner; supplying one
/// lets a caller re-run under a known ingestion-run identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub source: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl IngestionJob {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            options: serde_json::Map::new(),
            run_id: None,
        }
    }
}

/// Queue-side lifecycle of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting to be claimed (possibly gated by a retry time).
    Ready,
    /// Claimed by a worker.
    Running,
    /// Finished successfully; retained up to the completed-retention bound.
    Completed,
    /// Terminally failed after exhausting attempts; retained for inspection.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Ready => "ready",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ready" => Some(JobStatus::Ready),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}
