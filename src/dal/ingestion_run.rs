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

//! Ingestion run persistence.
//!
//! Rows are append/update only; the pipeline never deletes them. `start`
//! is an upsert so re-running a job under the same run id resets counters
//! instead of failing.

use diesel::prelude::*;

use super::models::{current_timestamp_string, parse_timestamp, IngestionRunRow, NewIngestionRunRow};
use super::DAL;
use crate::database::schema::ingestion_runs;
use crate::error::StorageError;
use crate::models::{IngestionRun, RunStatus};

/// Ingestion run operations.
pub struct IngestionRunDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> IngestionRunDAL<'a> {
    /// Upserts a run row to `running` with reset counters.
    pub async fn start(&self, run_id: &str, source: &str) -> Result<(), StorageError> {
        let run_id = run_id.to_string();
        let source = source.to_string();
        let conn = self.dal.conn().await?;

        conn.interact(move |conn| {
            let now = current_timestamp_string();
            diesel::insert_into(ingestion_runs::table)
                .values(NewIngestionRunRow {
                    id: run_id.clone(),
                    source: source.clone(),
                    status: RunStatus::Running.as_str().to_string(),
                    started_at: now.clone(),
                    finished_at: None,
                    bundles_ingested: 0,
                    bundles_failed: 0,
                    error_message: None,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                })
                .on_conflict(ingestion_runs::id)
                .do_update()
                .set((
                    ingestion_runs::source.eq(&source),
                    ingestion_runs::status.eq(RunStatus::Running.as_str()),
                    ingestion_runs::started_at.eq(&now),
                    ingestion_runs::finished_at.eq(None::<String>),
                    ingestion_runs::bundles_ingested.eq(0),
                    ingestion_runs::bundles_failed.eq(0),
                    ingestion_runs::error_message.eq(None::<String>),
                    ingestion_runs::updated_at.eq(&now),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Marks a run successful with final counters.
    pub async fn complete(
        &self,
        run_id: &str,
        ingested: i32,
        failed: i32,
    ) -> Result<(), StorageError> {
        let run_id = run_id.to_string();
        let conn = self.dal.conn().await?;

        conn.interact(move |conn| {
            let now = current_timestamp_string();
            diesel::update(ingestion_runs::table.find(run_id))
                .set((
                    ingestion_runs::status.eq(RunStatus::Success.as_str()),
                    ingestion_runs::finished_at.eq(Some(now.clone())),
                    ingestion_runs::bundles_ingested.eq(ingested),
                    ingestion_runs::bundles_failed.eq(failed),
                    ingestion_runs::error_message.eq(None::<String>),
                    ingestion_runs::updated_at.eq(&now),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Marks a run failed, recording the error's textual message.
    pub async fn fail(
        &self,
        run_id: &str,
        error_message: &str,
        ingested: i32,
        failed: i32,
    ) -> Result<(), StorageError> {
        let run_id = run_id.to_string();
        let error_message = error_message.to_string();
        let conn = self.dal.conn().await?;

        conn.interact(move |conn| {
            let now = current_timestamp_string();
            diesel::update(ingestion_runs::table.find(run_id))
                .set((
                    ingestion_runs::status.eq(RunStatus::Failed.as_str()),
                    ingestion_runs::finished_at.eq(Some(now.clone())),
                    ingestion_runs::bundles_ingested.eq(ingested),
                    ingestion_runs::bundles_failed.eq(failed),
                    ingestion_runs::error_message.eq(Some(error_message)),
                    ingestion_runs::updated_at.eq(&now),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Loads one run by id.
    pub async fn get(&self, run_id: &str) -> Result<Option<IngestionRun>, StorageError> {
        let run_id = run_id.to_string();
        let conn = self.dal.conn().await?;
        let row: Option<IngestionRunRow> = conn
            .interact(move |conn| {
                ingestion_runs::table
                    .find(run_id)
                    .select(IngestionRunRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        row.map(row_to_run).transpose()
    }

    /// Number of run rows recorded for one source, for diagnostics and tests.
    pub async fn count_for_source(&self, source: &str) -> Result<i64, StorageError> {
        let source = source.to_string();
        let conn = self.dal.conn().await?;
        let count = conn
            .interact(move |conn| {
                ingestion_runs::table
                    .filter(ingestion_runs::source.eq(source))
                    .count()
                    .first(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
        Ok(count)
    }
}

fn row_to_run(row: IngestionRunRow) -> Result<IngestionRun, StorageError> {
    let status = RunStatus::parse(&row.status)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown run status {:?}", row.status)))?;
    Ok(IngestionRun {
        id: row.id,
        source: row.source,
        status,
        started_at: parse_timestamp(&row.started_at)?,
        finished_at: row.finished_at.as_deref().map(parse_timestamp).transpose()?,
        bundles_ingested: row.bundles_ingested,
        bundles_failed: row.bundles_failed,
        error_message: row.error_message,
    })
}
