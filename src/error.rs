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

//! Error types for the ingestion pipeline.
//!
//! Each subsystem has its own error enum. Configuration errors skip the
//! affected unit of work, scrape and storage errors propagate out of the
//! job runner so the queue's retry policy can act on them.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating or parsing the source configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No source configuration file found in search paths")]
    NotFound,

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unsupported configuration format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("Environment variable expansion failed: {0}")]
    EnvVar(String),
}

/// Errors from the storage layer (connection pool, diesel, row decoding).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Errors a scraper implementation may surface from `fetch`.
///
/// Any scrape error is fatal to the run; the queue governs retries.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the durable job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Queue store not ready after {attempts} attempts: {message}")]
    NotReady { attempts: u32, message: String },
}

/// Errors from one end-to-end ingestion attempt.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Non-retryable configuration error: the source key has no scraper.
    #[error("No scraper registered for source {0}")]
    UnregisteredSource(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
