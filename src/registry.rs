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

//! # Scraper Registry
//!
//! Process-global registry mapping a source key to its scraper capability.
//! Registration is last-write-wins: overwriting an existing key logs a
//! warning and replaces the handler, it never errors.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::scraper::Scraper;

type ScraperMap = HashMap<String, Arc<dyn Scraper>>;

static GLOBAL_SCRAPER_REGISTRY: Lazy<Arc<RwLock<ScraperMap>>> =
    Lazy::new(|| Arc::new(RwLock::new(HashMap::new())));

/// Registers a scraper under a source key, replacing any existing handler.
pub fn register_scraper(name: impl Into<String>, scraper: Arc<dyn Scraper>) {
    let name = name.into();
    let mut registry = GLOBAL_SCRAPER_REGISTRY.write();
    if registry.contains_key(&name) {
        warn!(name = %name, "Scraper already registered, replacing existing handler");
    }
    registry.insert(name.clone(), scraper);
    debug!(name = %name, "Registered scraper");
}

/// Looks up the scraper for a source key.
///
/// Absence is a non-retryable configuration error for callers.
pub fn get_scraper(name: &str) -> Option<Arc<dyn Scraper>> {
    GLOBAL_SCRAPER_REGISTRY.read().get(name).cloned()
}

/// All registered source keys in lexicographic order, for diagnostics.
pub fn list_scrapers() -> Vec<String> {
    let mut names: Vec<String> = GLOBAL_SCRAPER_REGISTRY.read().keys().cloned().collect();
    names.sort();
    names
}

/// Clears the registry. Primarily useful for resetting state in tests.
pub fn clear_scrapers() {
    GLOBAL_SCRAPER_REGISTRY.write().clear();
}
