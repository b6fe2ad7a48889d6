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

//! Shared fixtures for integration tests.

use tempfile::TempDir;

use smartbundle_ingest::dal::DAL;
use smartbundle_ingest::database::Database;
use smartbundle_ingest::models::{BillingCycle, Bundle, BundleSource, Currency};

/// A migrated store backed by a temporary directory that lives as long
/// as the handle.
pub struct TestStore {
    pub dal: DAL,
    pub database: Database,
    _dir: TempDir,
}

pub async fn test_store() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("test.db");
    let database = Database::new(db_path.to_str().expect("utf-8 path"));
    database.run_migrations().await.expect("run migrations");
    TestStore {
        dal: DAL::new(database.clone()),
        database,
        _dir: dir,
    }
}

/// Canonical bundle with sensible defaults for tests.
pub fn bundle(id: &str, source: Option<BundleSource>) -> Bundle {
    Bundle {
        id: id.to_string(),
        name: format!("Bundle {}", id),
        services: vec!["Hulu".to_string(), "Disney+".to_string()],
        price: 14.99,
        currency: Currency::USD,
        billing_cycle: BillingCycle::Mo,
        regions: vec!["US".to_string()],
        provider: "Acme Wireless".to_string(),
        link: format!("https://acme.test/{}", id),
        tags: vec!["streaming".to_string()],
        summary: None,
        is_active: true,
        last_verified: None,
        source,
        confidence: None,
        raw_payload: None,
    }
}
