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

//! Durable queue job storage: enqueue, atomic claiming, retry scheduling,
//! terminal completion with bounded retention.
//!
//! SQLite has no `FOR UPDATE SKIP LOCKED`; claiming instead runs inside a
//! write transaction on the single pooled connection, which serializes
//! concurrent claim attempts so each job is claimed exactly once.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{
    blob_to_uuid, current_timestamp_string, format_timestamp, uuid_to_blob, IngestJobRow,
    NewIngestJobRow,
};
use super::DAL;
use crate::database::schema::ingest_jobs;
use crate::error::StorageError;
use crate::models::{IngestionJob, JobStatus};

/// Fully resolved parameters for a new queue row (defaults already applied).
#[derive(Debug, Clone)]
pub struct NewJobSpec {
    pub job: IngestionJob,
    pub max_attempts: i32,
    pub backoff_base_ms: i32,
    pub retain_completed: i32,
    pub retain_failed: i32,
}

/// A job handed to a worker, with the retry policy needed to act on failure.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: IngestionJob,
    /// Attempt number of this execution, starting at 1.
    pub attempt: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i32,
    pub retain_completed: i32,
    pub retain_failed: i32,
}

/// Queue job operations.
pub struct JobDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> JobDAL<'a> {
    /// Inserts a ready job row and returns its queue-assigned id.
    pub async fn enqueue(&self, spec: NewJobSpec) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        let row = NewIngestJobRow {
            id: uuid_to_blob(&id),
            source: spec.job.source.clone(),
            options: serde_json::to_string(&spec.job.options)?,
            run_id: spec.job.run_id.clone(),
            status: JobStatus::Ready.as_str().to_string(),
            attempt: 0,
            max_attempts: spec.max_attempts,
            backoff_base_ms: spec.backoff_base_ms,
            retry_at: None,
            retain_completed: spec.retain_completed,
            retain_failed: spec.retain_failed,
            created_at: current_timestamp_string(),
            updated_at: current_timestamp_string(),
        };

        let conn = self.dal.conn().await?;
        conn.interact(move |conn| {
            diesel::insert_into(ingest_jobs::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(id)
    }

    /// Atomically claims up to `limit` ready jobs whose retry time (if any)
    /// has elapsed, flipping them to running and bumping the attempt count.
    pub async fn claim(&self, limit: usize) -> Result<Vec<ClaimedJob>, StorageError> {
        let limit = limit as i64;
        let conn = self.dal.conn().await?;

        let rows: Vec<IngestJobRow> = conn
            .interact(move |conn| {
                conn.transaction::<Vec<IngestJobRow>, diesel::result::Error, _>(|conn| {
                    let now = current_timestamp_string();

                    let ready: Vec<IngestJobRow> = ingest_jobs::table
                        .filter(ingest_jobs::status.eq(JobStatus::Ready.as_str()))
                        .filter(
                            ingest_jobs::retry_at
                                .is_null()
                                .or(ingest_jobs::retry_at.le(&now)),
                        )
                        .order(ingest_jobs::created_at.asc())
                        .limit(limit)
                        .select(IngestJobRow::as_select())
                        .load(conn)?;

                    if ready.is_empty() {
                        return Ok(Vec::new());
                    }

                    let ids: Vec<Vec<u8>> = ready.iter().map(|r| r.id.clone()).collect();
                    diesel::update(ingest_jobs::table.filter(ingest_jobs::id.eq_any(ids)))
                        .set((
                            ingest_jobs::status.eq(JobStatus::Running.as_str()),
                            ingest_jobs::attempt.eq(ingest_jobs::attempt + 1),
                            ingest_jobs::started_at.eq(Some(now.clone())),
                            ingest_jobs::updated_at.eq(&now),
                        ))
                        .execute(conn)?;

                    Ok(ready)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        rows.into_iter()
            .map(|row| {
                Ok(ClaimedJob {
                    id: blob_to_uuid(&row.id)?,
                    job: IngestionJob {
                        source: row.source,
                        options: serde_json::from_str(&row.options)?,
                        run_id: row.run_id,
                    },
                    attempt: row.attempt + 1,
                    max_attempts: row.max_attempts,
                    backoff_base_ms: row.backoff_base_ms,
                    retain_completed: row.retain_completed,
                    retain_failed: row.retain_failed,
                })
            })
            .collect()
    }

    /// Returns a failed attempt to the ready state, gated until `retry_at`.
    pub async fn schedule_retry(
        &self,
        id: Uuid,
        retry_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<(), StorageError> {
        let id_blob = uuid_to_blob(&id);
        let retry_at = format_timestamp(retry_at);
        let error_message = error_message.to_string();
        let conn = self.dal.conn().await?;

        conn.interact(move |conn| {
            diesel::update(ingest_jobs::table.find(id_blob))
                .set((
                    ingest_jobs::status.eq(JobStatus::Ready.as_str()),
                    ingest_jobs::retry_at.eq(Some(retry_at)),
                    ingest_jobs::last_error.eq(Some(error_message)),
                    ingest_jobs::started_at.eq(None::<String>),
                    ingest_jobs::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Returns jobs still running since before `cutoff` to the ready state.
    ///
    /// A row stalls when the worker process that claimed it died mid-job;
    /// the attempt bump applied at claim time already charged the lost
    /// attempt, so a stalled row with no attempts left is failed terminally
    /// rather than re-readied. Returns the number of rows re-readied.
    pub async fn reclaim_stalled(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let cutoff = format_timestamp(cutoff);
        let conn = self.dal.conn().await?;

        let reclaimed = conn
            .interact(move |conn| {
                conn.transaction::<usize, diesel::result::Error, _>(|conn| {
                    let now = current_timestamp_string();

                    diesel::update(
                        ingest_jobs::table
                            .filter(ingest_jobs::status.eq(JobStatus::Running.as_str()))
                            .filter(ingest_jobs::started_at.le(&cutoff))
                            .filter(ingest_jobs::attempt.ge(ingest_jobs::max_attempts)),
                    )
                    .set((
                        ingest_jobs::status.eq(JobStatus::Failed.as_str()),
                        ingest_jobs::last_error
                            .eq(Some("worker stalled with no attempts left".to_string())),
                        ingest_jobs::completed_at.eq(Some(now.clone())),
                        ingest_jobs::updated_at.eq(&now),
                    ))
                    .execute(conn)?;

                    diesel::update(
                        ingest_jobs::table
                            .filter(ingest_jobs::status.eq(JobStatus::Running.as_str()))
                            .filter(ingest_jobs::started_at.le(&cutoff)),
                    )
                    .set((
                        ingest_jobs::status.eq(JobStatus::Ready.as_str()),
                        ingest_jobs::retry_at.eq(None::<String>),
                        ingest_jobs::started_at.eq(None::<String>),
                        ingest_jobs::updated_at.eq(&now),
                    ))
                    .execute(conn)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(reclaimed)
    }

    /// Marks a job completed and prunes completed rows beyond its retention.
    pub async fn mark_completed(&self, id: Uuid, retain: i32) -> Result<(), StorageError> {
        self.finalize(id, JobStatus::Completed, None, retain).await
    }

    /// Marks a job terminally failed, retaining the error for inspection,
    /// and prunes failed rows beyond its retention.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        retain: i32,
    ) -> Result<(), StorageError> {
        self.finalize(
            id,
            JobStatus::Failed,
            Some(error_message.to_string()),
            retain,
        )
        .await
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        retain: i32,
    ) -> Result<(), StorageError> {
        let id_blob = uuid_to_blob(&id);
        let conn = self.dal.conn().await?;

        conn.interact(move |conn| {
            conn.transaction::<(), diesel::result::Error, _>(|conn| {
                let now = current_timestamp_string();
                diesel::update(ingest_jobs::table.find(&id_blob))
                    .set((
                        ingest_jobs::status.eq(status.as_str()),
                        ingest_jobs::last_error.eq(&error_message),
                        ingest_jobs::completed_at.eq(Some(now.clone())),
                        ingest_jobs::updated_at.eq(&now),
                    ))
                    .execute(conn)?;

                // Bounded retention: keep the newest `retain` rows in this
                // terminal status, drop the rest.
                let finished: Vec<Vec<u8>> = ingest_jobs::table
                    .filter(ingest_jobs::status.eq(status.as_str()))
                    .order(ingest_jobs::completed_at.desc())
                    .select(ingest_jobs::id)
                    .load(conn)?;
                let stale: Vec<Vec<u8>> = finished
                    .into_iter()
                    .skip(retain.max(0) as usize)
                    .collect();
                if !stale.is_empty() {
                    diesel::delete(ingest_jobs::table.filter(ingest_jobs::id.eq_any(stale)))
                        .execute(conn)?;
                }

                Ok(())
            })
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Loads one job row by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<IngestJobRow>, StorageError> {
        let id_blob = uuid_to_blob(&id);
        let conn = self.dal.conn().await?;
        let row = conn
            .interact(move |conn| {
                ingest_jobs::table
                    .find(id_blob)
                    .select(IngestJobRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
        Ok(row)
    }

    /// Number of jobs currently in the given status.
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64, StorageError> {
        let conn = self.dal.conn().await?;
        let count = conn
            .interact(move |conn| {
                ingest_jobs::table
                    .filter(ingest_jobs::status.eq(status.as_str()))
                    .count()
                    .first(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
        Ok(count)
    }
}
