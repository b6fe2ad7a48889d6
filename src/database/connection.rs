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

//! SQLite connection management.
//!
//! Async connection pooling via `deadpool-diesel`. The pool is capped at a
//! single connection: SQLite has limited concurrent write support even with
//! WAL mode, and one connection avoids "database is locked" errors while
//! still serializing transactions correctly under concurrent workers.

use deadpool_diesel::sqlite::{Manager, Object, Pool, Runtime};
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use tracing::info;

use crate::database::MIGRATIONS;
use crate::error::StorageError;

/// A shared handle to a pooled SQLite database.
///
/// `Database` is `Clone`; each clone references the same underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
    url: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("url", &self.url).finish()
    }
}

impl Database {
    /// Creates a connection pool for the given connection string.
    ///
    /// Accepts a plain file path, `:memory:`, or a `sqlite://` prefixed path.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot be created.
    pub fn new(connection_string: &str) -> Self {
        let url = Self::build_sqlite_url(connection_string);
        let manager = Manager::new(url.clone(), Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .expect("Failed to create SQLite connection pool");

        info!(url = %url, "SQLite connection pool initialized");

        Self { pool, url }
    }

    /// Creates a database from an environment variable, if it is set.
    ///
    /// Absence is a valid configuration: the caller runs without that store.
    pub fn from_env(var: &str) -> Option<Self> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Some(Self::new(&value)),
            _ => None,
        }
    }

    /// Returns a clone of the underlying pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Checks out a connection from the pool.
    pub async fn get_connection(&self) -> Result<Object, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))
    }

    /// Runs pending migrations, setting SQLite pragmas first.
    ///
    /// WAL mode allows concurrent reads during writes; `busy_timeout` makes
    /// SQLite wait instead of immediately failing on locks.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.get_connection().await?;
        conn.interact(|conn| {
            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| StorageError::Migration(e.to_string()))?;
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| StorageError::Migration(e.to_string()))?;

            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| StorageError::Migration(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
    }

    /// Executes a trivial query to verify the store is reachable.
    pub async fn ping(&self) -> Result<(), StorageError> {
        let conn = self.get_connection().await?;
        conn.interact(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
        Ok(())
    }

    fn build_sqlite_url(connection_string: &str) -> String {
        match connection_string.strip_prefix("sqlite://") {
            Some(path) => path.to_string(),
            None => connection_string.to_string(),
        }
    }
}
