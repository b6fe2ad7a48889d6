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

//! # Normalizer
//!
//! Turns raw [`ScrapedBundle`] records into canonical [`Bundle`]s.
//! Service names go through a case-insensitive alias table, tags are
//! lowercased and trimmed, then the record is validated against the
//! canonical schema. Records that fail validation are dropped with
//! field-level reasons; they never reach persistence and never fail
//! the run.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::warn;
use url::Url;

use crate::models::{BillingCycle, Bundle, BundleSource, Currency, ScrapedBundle};

/// Known service-name aliases, matched case-insensitively against the
/// trimmed input. Unknown names pass through trimmed, case preserved.
const SERVICE_ALIASES: &[(&str, &str)] = &[
    ("disney plus", "Disney+"),
    ("disney+", "Disney+"),
    ("hulu", "Hulu"),
    ("espn", "ESPN+"),
    ("espn+", "ESPN+"),
    ("spotify", "Spotify"),
    ("apple tv", "Apple TV+"),
    ("apple tv+", "Apple TV+"),
    ("netflix", "Netflix"),
    ("max", "Max"),
    ("paramount plus", "Paramount+"),
    ("paramount+", "Paramount+"),
    ("peacock", "Peacock"),
    ("youtube premium", "YouTube Premium"),
    ("amazon prime video", "Prime Video"),
    ("prime video", "Prime Video"),
];

/// A record dropped by validation, carrying every failed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRejection {
    pub id: String,
    pub reasons: Vec<String>,
}

impl fmt::Display for BundleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundle {} rejected: {}", self.id, self.reasons.join("; "))
    }
}

/// Canonicalizes one service name via the alias table.
pub fn canonicalize_service(name: &str) -> String {
    let trimmed = name.trim();
    let lowered = trimmed.to_lowercase();
    for (alias, canonical) in SERVICE_ALIASES {
        if *alias == lowered {
            return (*canonical).to_string();
        }
    }
    trimmed.to_string()
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

/// Canonicalizes and validates one scraped record.
///
/// Returns the canonical bundle, or the full set of field-level reasons
/// it was rejected for.
pub fn normalize_bundle(raw: &ScrapedBundle) -> Result<Bundle, BundleRejection> {
    let mut reasons = Vec::new();

    let id = raw.id.trim().to_string();
    if id.is_empty() {
        reasons.push("id must be non-empty".to_string());
    }

    let name = raw.name.trim().to_string();
    if name.is_empty() {
        reasons.push("name must be non-empty".to_string());
    }

    let services = dedup_preserving_order(
        raw.services
            .iter()
            .map(|s| canonicalize_service(s))
            .collect(),
    );
    if services.is_empty() {
        reasons.push("services must be non-empty".to_string());
    }

    if !raw.price.is_finite() || raw.price < 0.0 {
        reasons.push(format!("price must be >= 0, got {}", raw.price));
    }

    let currency = Currency::parse(raw.currency.trim());
    if currency.is_none() {
        reasons.push(format!("unsupported currency {:?}", raw.currency));
    }

    let billing_cycle = match raw.billing_cycle.as_deref() {
        None => Some(BillingCycle::default()),
        Some(value) => {
            let parsed = BillingCycle::parse(value.trim());
            if parsed.is_none() {
                reasons.push(format!("unsupported billing cycle {:?}", value));
            }
            parsed
        }
    };

    let regions = dedup_preserving_order(
        raw.regions.iter().map(|r| r.trim().to_string()).collect(),
    );
    if regions.is_empty() {
        reasons.push("regions must be non-empty".to_string());
    }

    let provider = raw.provider.trim().to_string();
    if provider.is_empty() {
        reasons.push("provider must be non-empty".to_string());
    }

    let link = raw.link.trim().to_string();
    match Url::parse(&link) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => reasons.push(format!("link scheme must be http or https, got {}", url.scheme())),
        Err(_) => reasons.push(format!("link is not a valid URL: {:?}", link)),
    }

    let tags = dedup_preserving_order(
        raw.tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect(),
    );

    let last_verified: Option<DateTime<Utc>> = match raw.last_verified.as_deref() {
        None => None,
        Some(value) => match DateTime::parse_from_rfc3339(value.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => {
                reasons.push(format!("lastVerified is not an RFC 3339 timestamp: {:?}", value));
                None
            }
        },
    };

    // Values outside the canonical set are untagged, not rejected.
    let source = raw
        .source
        .as_deref()
        .and_then(|s| BundleSource::parse(s.trim()));

    if !reasons.is_empty() {
        return Err(BundleRejection {
            id: if id.is_empty() { raw.id.clone() } else { id },
            reasons,
        });
    }

    Ok(Bundle {
        id,
        name,
        services,
        price: raw.price,
        currency: currency.unwrap_or(Currency::USD),
        billing_cycle: billing_cycle.unwrap_or_default(),
        regions,
        provider,
        link,
        tags,
        summary: raw.summary.as_ref().map(|s| s.trim().to_string()),
        is_active: raw.is_active,
        last_verified,
        source,
        confidence: raw.confidence,
        raw_payload: raw.raw_payload.clone(),
    })
}

/// Normalizes a batch, dropping and logging invalid records.
///
/// The returned counts drive the run's `ingested`/`failed` bookkeeping.
pub fn normalize_batch(raw: &[ScrapedBundle]) -> Vec<Bundle> {
    let mut out = Vec::with_capacity(raw.len());
    for record in raw {
        match normalize_bundle(record) {
            Ok(bundle) => out.push(bundle),
            Err(rejection) => {
                warn!(bundle_id = %rejection.id, reasons = ?rejection.reasons, "Dropping invalid bundle");
            }
        }
    }
    out
}
