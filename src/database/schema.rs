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

//! Diesel table definitions for the SQLite schema.
//!
//! Storage conventions: timestamps as RFC3339 TEXT (fixed-width, so
//! lexicographic order matches chronological order), UUIDs as 16-byte
//! BLOBs, booleans as INTEGER 0/1, list and map fields as JSON TEXT.

diesel::table! {
    bundles (id) {
        id -> Text,
        name -> Text,
        services -> Text,
        price_cents -> Integer,
        currency -> Text,
        billing_cycle -> Text,
        regions -> Text,
        provider -> Text,
        link -> Text,
        tags -> Text,
        summary -> Nullable<Text>,
        is_active -> Integer,
        last_verified_at -> Text,
        source -> Nullable<Text>,
        confidence -> Nullable<Double>,
        raw_payload -> Nullable<Text>,
        data_hash -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    bundle_history (id) {
        id -> Binary,
        bundle_id -> Text,
        captured_at -> Text,
        price_cents -> Integer,
        currency -> Text,
        billing_cycle -> Text,
    }
}

diesel::table! {
    ingestion_runs (id) {
        id -> Text,
        source -> Text,
        status -> Text,
        started_at -> Text,
        finished_at -> Nullable<Text>,
        bundles_ingested -> Integer,
        bundles_failed -> Integer,
        error_message -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    ingest_jobs (id) {
        id -> Binary,
        source -> Text,
        options -> Text,
        run_id -> Nullable<Text>,
        status -> Text,
        attempt -> Integer,
        max_attempts -> Integer,
        backoff_base_ms -> Integer,
        retry_at -> Nullable<Text>,
        retain_completed -> Integer,
        retain_failed -> Integer,
        last_error -> Nullable<Text>,
        started_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(bundle_history -> bundles (bundle_id));

diesel::allow_tables_to_appear_in_same_query!(bundles, bundle_history, ingestion_runs, ingest_jobs);
