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

//! Data access layer.
//!
//! One `DAL` per database handle, with per-entity accessors. All multi-step
//! write paths run inside a single diesel transaction on the checked-out
//! connection; any failure rolls back the whole unit.

pub mod bundle;
pub mod ingestion_run;
pub mod job;
pub mod models;

use crate::database::Database;
use crate::error::StorageError;

pub use bundle::{BundleDAL, PersistResult};
pub use ingestion_run::IngestionRunDAL;
pub use job::{ClaimedJob, JobDAL, NewJobSpec};

/// Data access layer over one SQLite database.
#[derive(Clone, Debug)]
pub struct DAL {
    pub(crate) database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Canonical bundle store and history operations.
    pub fn bundles(&self) -> BundleDAL<'_> {
        BundleDAL { dal: self }
    }

    /// Ingestion run lifecycle records.
    pub fn ingestion_runs(&self) -> IngestionRunDAL<'_> {
        IngestionRunDAL { dal: self }
    }

    /// Durable queue job operations.
    pub fn jobs(&self) -> JobDAL<'_> {
        JobDAL { dal: self }
    }

    pub(crate) async fn conn(&self) -> Result<deadpool_diesel::sqlite::Object, StorageError> {
        self.database.get_connection().await
    }
}
