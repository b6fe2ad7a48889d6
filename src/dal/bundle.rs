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

//! Transactional bundle persistence.
//!
//! `persist` merges one run's canonical bundles into the store as a single
//! all-or-nothing transaction: insert on first sighting, skip on unchanged
//! content hash, update on changed hash (appending price history only when
//! pricing fields moved), then deactivate rows of the same source that were
//! absent from this run's input.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use super::models::{
    current_timestamp_string, format_timestamp, uuid_to_blob, BundleChangeset, BundleRow,
    NewBundleHistoryRow, NewBundleRow,
};
use super::DAL;
use crate::database::schema::{bundle_history, bundles};
use crate::error::StorageError;
use crate::models::{Bundle, BundleSource};

/// Outcome counters for one `persist` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistResult {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub history: usize,
    pub deactivated: usize,
}

impl PersistResult {
    /// Rows written this run (created + updated).
    pub fn upserts(&self) -> usize {
        self.created + self.updated
    }

    /// Degraded-mode result: no store configured, everything reported skipped.
    pub fn store_disabled(input_len: usize) -> Self {
        Self {
            skipped: input_len,
            ..Self::default()
        }
    }
}

/// Field set covered by the content hash. A stored row whose hash equals the
/// freshly computed one is an unchanged re-scrape and costs no writes.
#[derive(Serialize)]
struct HashPayload<'a> {
    name: &'a str,
    services: &'a [String],
    price_cents: i32,
    currency: &'a str,
    billing_cycle: &'a str,
    regions: &'a [String],
    provider: &'a str,
    link: &'a str,
    tags: &'a [String],
    summary: &'a str,
    is_active: bool,
    source: Option<&'a str>,
}

/// A bundle with its storage encoding precomputed, ready to move into the
/// transaction closure.
struct PreparedBundle {
    id: String,
    name: String,
    services: String,
    price_cents: i32,
    currency: &'static str,
    billing_cycle: &'static str,
    regions: String,
    provider: String,
    link: String,
    tags: String,
    summary: Option<String>,
    is_active: bool,
    last_verified_at: String,
    source: Option<&'static str>,
    confidence: Option<f64>,
    raw_payload: Option<String>,
    data_hash: String,
}

fn compute_data_hash(payload: &HashPayload<'_>) -> Result<String, StorageError> {
    let encoded = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Ok(format!("{:x}", hasher.finalize()))
}

fn prepare_bundle(bundle: &Bundle, job_source: &str) -> Result<PreparedBundle, StorageError> {
    let price_cents = bundle.price_cents();
    let resolved_source = bundle
        .source
        .or_else(|| BundleSource::parse(job_source))
        .map(|s| s.as_str());
    let last_verified_at = format_timestamp(bundle.last_verified.unwrap_or_else(Utc::now));

    let data_hash = compute_data_hash(&HashPayload {
        name: &bundle.name,
        services: &bundle.services,
        price_cents,
        currency: bundle.currency.as_str(),
        billing_cycle: bundle.billing_cycle.as_str(),
        regions: &bundle.regions,
        provider: &bundle.provider,
        link: &bundle.link,
        tags: &bundle.tags,
        summary: bundle.summary.as_deref().unwrap_or(""),
        is_active: bundle.is_active,
        source: resolved_source,
    })?;

    Ok(PreparedBundle {
        id: bundle.id.clone(),
        name: bundle.name.clone(),
        services: serde_json::to_string(&bundle.services)?,
        price_cents,
        currency: bundle.currency.as_str(),
        billing_cycle: bundle.billing_cycle.as_str(),
        regions: serde_json::to_string(&bundle.regions)?,
        provider: bundle.provider.clone(),
        link: bundle.link.clone(),
        tags: serde_json::to_string(&bundle.tags)?,
        summary: bundle.summary.clone(),
        is_active: bundle.is_active,
        last_verified_at,
        source: resolved_source,
        confidence: bundle.confidence,
        raw_payload: bundle
            .raw_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        data_hash,
    })
}

/// Bundle store operations.
pub struct BundleDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> BundleDAL<'a> {
    /// Merges one run's bundles into the store inside one transaction.
    ///
    /// `started_at` is the run's start time; the deactivation sweep skips
    /// rows touched at or after it, so a concurrent run that re-upserted a
    /// bundle after this run began cannot have it retired by this run's
    /// stale view of the source.
    pub async fn persist(
        &self,
        run_id: &str,
        source: &str,
        started_at: DateTime<Utc>,
        input: &[Bundle],
    ) -> Result<PersistResult, StorageError> {
        if input.is_empty() {
            return Ok(PersistResult::default());
        }

        let prepared: Vec<PreparedBundle> = input
            .iter()
            .map(|b| prepare_bundle(b, source))
            .collect::<Result<_, _>>()?;
        let sweep_source = BundleSource::parse(source).map(|s| s.as_str());
        let sweep_cutoff = format_timestamp(started_at);
        let run_id = run_id.to_string();

        let conn = self.dal.conn().await?;
        let result = conn
            .interact(move |conn| {
                conn.transaction::<PersistResult, StorageError, _>(|conn| {
                    let mut result = PersistResult::default();
                    let mut seen: HashSet<String> = HashSet::new();

                    for bundle in &prepared {
                        seen.insert(bundle.id.clone());
                        let now = current_timestamp_string();

                        let existing: Option<BundleRow> = bundles::table
                            .find(&bundle.id)
                            .select(BundleRow::as_select())
                            .first(conn)
                            .optional()?;

                        match existing {
                            None => {
                                diesel::insert_into(bundles::table)
                                    .values(NewBundleRow {
                                        id: bundle.id.clone(),
                                        name: bundle.name.clone(),
                                        services: bundle.services.clone(),
                                        price_cents: bundle.price_cents,
                                        currency: bundle.currency.to_string(),
                                        billing_cycle: bundle.billing_cycle.to_string(),
                                        regions: bundle.regions.clone(),
                                        provider: bundle.provider.clone(),
                                        link: bundle.link.clone(),
                                        tags: bundle.tags.clone(),
                                        summary: bundle.summary.clone(),
                                        is_active: bundle.is_active as i32,
                                        last_verified_at: bundle.last_verified_at.clone(),
                                        source: bundle.source.map(str::to_string),
                                        confidence: bundle.confidence,
                                        raw_payload: bundle.raw_payload.clone(),
                                        data_hash: bundle.data_hash.clone(),
                                        created_at: now.clone(),
                                        updated_at: now,
                                    })
                                    .execute(conn)?;

                                append_history(conn, bundle)?;
                                result.created += 1;
                                result.history += 1;
                            }
                            Some(row) if row.data_hash == bundle.data_hash => {
                                // Dominant path on unchanged re-scrapes.
                                result.skipped += 1;
                            }
                            Some(row) => {
                                diesel::update(bundles::table.find(&bundle.id))
                                    .set(BundleChangeset {
                                        name: bundle.name.clone(),
                                        services: bundle.services.clone(),
                                        price_cents: bundle.price_cents,
                                        currency: bundle.currency.to_string(),
                                        billing_cycle: bundle.billing_cycle.to_string(),
                                        regions: bundle.regions.clone(),
                                        provider: bundle.provider.clone(),
                                        link: bundle.link.clone(),
                                        tags: bundle.tags.clone(),
                                        summary: bundle.summary.clone(),
                                        is_active: bundle.is_active as i32,
                                        last_verified_at: bundle.last_verified_at.clone(),
                                        source: bundle.source.map(str::to_string),
                                        confidence: bundle.confidence,
                                        raw_payload: bundle.raw_payload.clone(),
                                        data_hash: bundle.data_hash.clone(),
                                        updated_at: now,
                                    })
                                    .execute(conn)?;
                                result.updated += 1;

                                // History tracks pricing specifically; name,
                                // service, or tag edits do not append.
                                let pricing_changed = row.price_cents != bundle.price_cents
                                    || row.currency != bundle.currency
                                    || row.billing_cycle != bundle.billing_cycle;
                                if pricing_changed {
                                    append_history(conn, bundle)?;
                                    result.history += 1;
                                }
                            }
                        }
                    }

                    // Offers that disappeared from the source are retired.
                    // Scoped strictly by source; never reaches other sources'
                    // rows even on id collision.
                    if let Some(src) = sweep_source {
                        let seen_ids: Vec<String> = seen.into_iter().collect();
                        result.deactivated = diesel::update(
                            bundles::table
                                .filter(bundles::source.eq(src))
                                .filter(bundles::is_active.eq(1))
                                .filter(bundles::id.ne_all(seen_ids))
                                .filter(bundles::updated_at.lt(&sweep_cutoff)),
                        )
                        .set((
                            bundles::is_active.eq(0),
                            bundles::updated_at.eq(current_timestamp_string()),
                        ))
                        .execute(conn)?;
                    }

                    debug!(
                        run_id = %run_id,
                        created = result.created,
                        updated = result.updated,
                        skipped = result.skipped,
                        history = result.history,
                        deactivated = result.deactivated,
                        "Persisted bundle batch"
                    );
                    Ok(result)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(result)
    }

    /// Loads one bundle row by natural id.
    pub async fn get(&self, id: &str) -> Result<Option<BundleRow>, StorageError> {
        let id = id.to_string();
        let conn = self.dal.conn().await?;
        let row = conn
            .interact(move |conn| {
                bundles::table
                    .find(id)
                    .select(BundleRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
        Ok(row)
    }

    /// History entries for one bundle in capture order.
    pub async fn history(
        &self,
        bundle_id: &str,
    ) -> Result<Vec<super::models::BundleHistoryRow>, StorageError> {
        let bundle_id = bundle_id.to_string();
        let conn = self.dal.conn().await?;
        let rows = conn
            .interact(move |conn| {
                bundle_history::table
                    .filter(bundle_history::bundle_id.eq(bundle_id))
                    .order(bundle_history::captured_at.asc())
                    .select(super::models::BundleHistoryRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
        Ok(rows)
    }
}

fn append_history(
    conn: &mut SqliteConnection,
    bundle: &PreparedBundle,
) -> Result<(), diesel::result::Error> {
    diesel::insert_into(bundle_history::table)
        .values(NewBundleHistoryRow {
            id: uuid_to_blob(&Uuid::new_v4()),
            bundle_id: bundle.id.clone(),
            captured_at: bundle.last_verified_at.clone(),
            price_cents: bundle.price_cents,
            currency: bundle.currency.to_string(),
            billing_cycle: bundle.billing_cycle.to_string(),
        })
        .execute(conn)?;
    Ok(())
}
