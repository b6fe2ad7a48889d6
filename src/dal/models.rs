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

//! SQLite row models and storage encoding helpers.
//!
//! These structs mirror the schema exactly and are converted to/from domain
//! types at the DAL boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::{bundle_history, bundles, ingest_jobs, ingestion_runs};
use crate::error::StorageError;

/// Serializes a timestamp with fixed width so TEXT comparison matches
/// chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn current_timestamp_string() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp {value:?}: {e}")))
}

pub fn uuid_to_blob(id: &Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub fn blob_to_uuid(blob: &[u8]) -> Result<Uuid, StorageError> {
    Uuid::from_slice(blob).map_err(|e| StorageError::Corrupt(format!("bad uuid blob: {e}")))
}

// ============================================================================
// Bundle rows
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bundles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BundleRow {
    pub id: String,
    pub name: String,
    pub services: String,
    pub price_cents: i32,
    pub currency: String,
    pub billing_cycle: String,
    pub regions: String,
    pub provider: String,
    pub link: String,
    pub tags: String,
    pub summary: Option<String>,
    pub is_active: i32,
    pub last_verified_at: String,
    pub source: Option<String>,
    pub confidence: Option<f64>,
    pub raw_payload: Option<String>,
    pub data_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bundles)]
pub struct NewBundleRow {
    pub id: String,
    pub name: String,
    pub services: String,
    pub price_cents: i32,
    pub currency: String,
    pub billing_cycle: String,
    pub regions: String,
    pub provider: String,
    pub link: String,
    pub tags: String,
    pub summary: Option<String>,
    pub is_active: i32,
    pub last_verified_at: String,
    pub source: Option<String>,
    pub confidence: Option<f64>,
    pub raw_payload: Option<String>,
    pub data_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Mutable fields rewritten on a content-hash change. `None` writes NULL
/// rather than leaving the stored value in place: a cleared summary or
/// source must actually clear the column.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = bundles)]
#[diesel(treat_none_as_null = true)]
pub struct BundleChangeset {
    pub name: String,
    pub services: String,
    pub price_cents: i32,
    pub currency: String,
    pub billing_cycle: String,
    pub regions: String,
    pub provider: String,
    pub link: String,
    pub tags: String,
    pub summary: Option<String>,
    pub is_active: i32,
    pub last_verified_at: String,
    pub source: Option<String>,
    pub confidence: Option<f64>,
    pub raw_payload: Option<String>,
    pub data_hash: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bundle_history)]
pub struct NewBundleHistoryRow {
    pub id: Vec<u8>,
    pub bundle_id: String,
    pub captured_at: String,
    pub price_cents: i32,
    pub currency: String,
    pub billing_cycle: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bundle_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BundleHistoryRow {
    pub id: Vec<u8>,
    pub bundle_id: String,
    pub captured_at: String,
    pub price_cents: i32,
    pub currency: String,
    pub billing_cycle: String,
}

// ============================================================================
// Ingestion run rows
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ingestion_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngestionRunRow {
    pub id: String,
    pub source: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub bundles_ingested: i32,
    pub bundles_failed: i32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ingestion_runs)]
pub struct NewIngestionRunRow {
    pub id: String,
    pub source: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub bundles_ingested: i32,
    pub bundles_failed: i32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Queue job rows
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ingest_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngestJobRow {
    pub id: Vec<u8>,
    pub source: String,
    pub options: String,
    pub run_id: Option<String>,
    pub status: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i32,
    pub retry_at: Option<String>,
    pub retain_completed: i32,
    pub retain_failed: i32,
    pub last_error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ingest_jobs)]
pub struct NewIngestJobRow {
    pub id: Vec<u8>,
    pub source: String,
    pub options: String,
    pub run_id: Option<String>,
    pub status: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i32,
    pub retry_at: Option<String>,
    pub retain_completed: i32,
    pub retain_failed: i32,
    pub created_at: String,
    pub updated_at: String,
}
