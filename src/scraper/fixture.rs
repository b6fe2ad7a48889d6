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

//! File-backed scraper that reads bundles from a JSON fixture on disk.
//! Useful for local development and as the reference implementation of
//! the [`Scraper`] contract.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::ScrapeError;
use crate::models::ScrapedBundle;
use crate::scraper::{ScrapeContext, Scraper};

/// Reads a JSON array of raw bundles from a file.
///
/// The file path comes from the job's `fixture` option when present,
/// otherwise from the path the scraper was constructed with.
#[derive(Debug, Clone)]
pub struct FixtureScraper {
    default_path: PathBuf,
}

impl FixtureScraper {
    pub fn new(default_path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: default_path.into(),
        }
    }

    fn resolve_path(&self, ctx: &ScrapeContext) -> PathBuf {
        ctx.option_str("fixture")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_path.clone())
    }
}

#[async_trait]
impl Scraper for FixtureScraper {
    async fn fetch(&self, ctx: &ScrapeContext) -> Result<Vec<ScrapedBundle>, ScrapeError> {
        let path = self.resolve_path(ctx);
        debug!(source = %ctx.source, path = %path.display(), "Reading bundle fixture");
        let contents = tokio::fs::read_to_string(&path).await?;
        let bundles: Vec<ScrapedBundle> = serde_json::from_str(&contents)?;
        Ok(bundles)
    }
}
