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

//! # Scraper Contract
//!
//! A scraper turns a source into raw bundle records. Implementations are
//! registered in the global registry and invoked by the job runner with a
//! per-run context. Scrapers only fetch and shape payloads; validation and
//! canonicalization happen downstream in the normalizer.

mod fixture;

pub use fixture::FixtureScraper;

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::models::ScrapedBundle;

/// Per-invocation context handed to a scraper.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    /// Identifier of the ingestion run this fetch belongs to.
    pub run_id: String,
    /// Source key the scraper was resolved under.
    pub source: String,
    /// Free-form options carried on the job payload.
    pub options: serde_json::Map<String, serde_json::Value>,
    /// Shared HTTP client for scrapers that talk to the network.
    pub http: reqwest::Client,
}

impl ScrapeContext {
    /// String-typed option lookup, for scrapers keyed off job options.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// Capability interface for fetching raw bundles from one source.
#[async_trait]
pub trait Scraper: Send + Sync + std::fmt::Debug {
    /// Fetches the current set of raw bundles for this source.
    ///
    /// Errors are retryable from the queue's perspective; a scraper that
    /// wants a run to fail permanently still returns an error and lets the
    /// attempt budget run out.
    async fn fetch(&self, ctx: &ScrapeContext) -> Result<Vec<ScrapedBundle>, ScrapeError>;
}
