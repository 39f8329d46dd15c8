/*
 *  Copyright 2025-2026 Colliery Software
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

//! Job Data Access Layer
//!
//! Row-level operations on the `jobs` table:
//! - creation, single and batched (one transaction, all or nothing)
//! - atomic claiming (`claiming`)
//! - state transitions after execution, promotion of due retries, operator
//!   resets and orphan recovery (`state`)
//! - read-only reporting queries (`reporting`)

mod claiming;
mod reporting;
mod state;

use super::DAL;
use crate::error::QueueError;
use crate::models::job::{Job, JobStatus};
use diesel::prelude::*;
use uuid::Uuid;

/// Rows per `INSERT` on PostgreSQL, keeping each statement under the
/// 65,535 bind-parameter limit.
#[cfg(feature = "postgres")]
const PG_INSERT_CHUNK_SIZE: usize = 1_000;

/// Statuses a due job may be claimed from. A `retrying` row becomes
/// claimable as soon as its backoff has elapsed.
fn claimable_statuses() -> Vec<&'static str> {
    vec![JobStatus::Pending.as_str(), JobStatus::Retrying.as_str()]
}

/// Data access layer for job rows with runtime backend selection.
#[derive(Clone)]
pub struct JobDAL<'a> {
    dal: &'a DAL,
}

impl<'a> JobDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a fully formed job row.
    pub async fn create(&self, job: Job) -> Result<Job, QueueError> {
        self.create_batch(vec![job])
            .await?
            .pop()
            .ok_or_else(|| QueueError::CorruptRow("insert returned no row".to_string()))
    }

    /// Inserts all rows in a single transaction. If any row fails, none are
    /// written.
    pub async fn create_batch(&self, jobs: Vec<Job>) -> Result<Vec<Job>, QueueError> {
        if jobs.is_empty() {
            return Ok(jobs);
        }
        crate::dispatch_backend!(
            self.dal.backend(),
            self.create_batch_postgres(jobs).await,
            self.create_batch_sqlite(jobs).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn create_batch_postgres(&self, jobs: Vec<Job>) -> Result<Vec<Job>, QueueError> {
        use crate::dal::models::NewPgJobRow;
        use crate::database::schema::postgres::jobs as jobs_table;
        use diesel::connection::Connection;

        let rows = jobs
            .iter()
            .map(NewPgJobRow::from_job)
            .collect::<Result<Vec<_>, _>>()?;

        let conn = self.dal.database.get_postgres_connection().await?;
        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                for chunk in rows.chunks(PG_INSERT_CHUNK_SIZE) {
                    diesel::insert_into(jobs_table::table)
                        .values(chunk)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(jobs)
    }

    #[cfg(feature = "sqlite")]
    async fn create_batch_sqlite(&self, jobs: Vec<Job>) -> Result<Vec<Job>, QueueError> {
        use crate::dal::models::NewSqliteJobRow;
        use crate::database::schema::sqlite::jobs as jobs_table;
        use diesel::connection::Connection;

        let rows = jobs
            .iter()
            .map(NewSqliteJobRow::from_job)
            .collect::<Result<Vec<_>, _>>()?;

        let conn = self.dal.database.get_sqlite_connection().await?;
        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                // SQLite multi-row VALUES are capped by the bound-parameter
                // limit, so insert row by row inside the transaction.
                for row in &rows {
                    diesel::insert_into(jobs_table::table)
                        .values(row)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(jobs)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.get_by_id_postgres(id).await,
            self.get_by_id_sqlite(id).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn get_by_id_postgres(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        use crate::dal::models::PgJobRow;
        use crate::database::schema::postgres::jobs;

        let conn = self.dal.database.get_postgres_connection().await?;
        let row: Option<PgJobRow> = conn
            .interact(move |conn| {
                jobs::table
                    .find(id)
                    .select(PgJobRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        row.map(Job::try_from).transpose()
    }

    #[cfg(feature = "sqlite")]
    async fn get_by_id_sqlite(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        use crate::dal::models::{uuid_to_blob, SqliteJobRow};
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let blob = uuid_to_blob(&id);
        let row: Option<SqliteJobRow> = conn
            .interact(move |conn| {
                jobs::table
                    .find(blob)
                    .select(SqliteJobRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        row.map(Job::try_from).transpose()
    }
}
