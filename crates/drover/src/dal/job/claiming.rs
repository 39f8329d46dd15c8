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

//! Atomic claiming.
//!
//! Selecting the row and flipping it to `processing` happen in one
//! transaction, under a row lock (PostgreSQL) or the database write lock
//! (SQLite). A job can therefore never be handed to two claimants.

use super::{claimable_statuses, JobDAL};
use crate::error::QueueError;
use crate::models::job::{Job, JobStatus};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

impl<'a> JobDAL<'a> {
    /// Claims the next eligible job: `pending` or `retrying`, due, highest
    /// priority first, earliest `scheduled_at` within a priority.
    pub async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.claim_postgres(None, now).await,
            self.claim_sqlite(None, now).await
        )
    }

    /// Claims `id` if, and only if, it is still `pending` or `retrying` and due.
    ///
    /// A row that is locked by another claimant, already claimed, resolved or
    /// not yet visible is reported as `None`.
    pub async fn claim_by_id(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.claim_postgres(Some(id), now).await,
            self.claim_sqlite(Some(id), now).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn claim_postgres(
        &self,
        id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, QueueError> {
        use crate::dal::models::{to_naive, PgJobRow};
        use crate::database::schema::postgres::jobs;
        use diesel::connection::Connection;

        let conn = self.dal.database.get_postgres_connection().await?;
        let now = to_naive(&now);

        let claimed: Option<PgJobRow> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let pending = jobs::status.eq_any(claimable_statuses());
                    let due = jobs::scheduled_at.le(now);

                    let candidate: Option<PgJobRow> = match id {
                        Some(id) => jobs::table
                            .find(id)
                            .filter(pending)
                            .filter(due)
                            .select(PgJobRow::as_select())
                            .for_update()
                            .skip_locked()
                            .get_result(conn)
                            .optional()?,
                        None => jobs::table
                            .filter(pending)
                            .filter(due)
                            .order((jobs::priority.desc(), jobs::scheduled_at.asc()))
                            .select(PgJobRow::as_select())
                            .limit(1)
                            .for_update()
                            .skip_locked()
                            .get_result(conn)
                            .optional()?,
                    };

                    let Some(row) = candidate else {
                        return Ok(None);
                    };

                    diesel::update(jobs::table.find(row.id))
                        .set((
                            jobs::status.eq(JobStatus::Processing.as_str()),
                            jobs::claimed_at.eq(Some(now)),
                            jobs::started_at.eq(row.started_at.or(Some(now))),
                        ))
                        .returning(PgJobRow::as_returning())
                        .get_result(conn)
                        .map(Some)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        claimed.map(Job::try_from).transpose()
    }

    #[cfg(feature = "sqlite")]
    async fn claim_sqlite(
        &self,
        id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, QueueError> {
        use crate::dal::models::{datetime_to_string, uuid_to_blob, SqliteJobRow};
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let now = datetime_to_string(&now);
        let id = id.map(|id| uuid_to_blob(&id));

        // SQLite has no SKIP LOCKED. An IMMEDIATE transaction takes the write
        // lock before the SELECT, which serializes competing claimants.
        let claimed: Option<SqliteJobRow> = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let mut query = jobs::table
                        .select(SqliteJobRow::as_select())
                        .filter(jobs::status.eq_any(claimable_statuses()))
                        .filter(jobs::scheduled_at.le(now.clone()))
                        .order((jobs::priority.desc(), jobs::scheduled_at.asc()))
                        .into_boxed();
                    if let Some(id) = id {
                        query = query.filter(jobs::id.eq(id));
                    }

                    let candidate: Option<SqliteJobRow> = query.first(conn).optional()?;

                    let Some(row) = candidate else {
                        return Ok(None);
                    };

                    let started_at = row.started_at.clone().unwrap_or_else(|| now.clone());
                    diesel::update(jobs::table.find(row.id.clone()))
                        .set((
                            jobs::status.eq(JobStatus::Processing.as_str()),
                            jobs::claimed_at.eq(Some(now.clone())),
                            jobs::started_at.eq(Some(started_at)),
                        ))
                        .execute(conn)?;

                    jobs::table
                        .find(row.id)
                        .select(SqliteJobRow::as_select())
                        .first(conn)
                        .map(Some)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        claimed.map(Job::try_from).transpose()
    }
}
