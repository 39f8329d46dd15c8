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

//! State transitions after a claim, plus the maintenance transitions driven
//! by the mover and by operators.
//!
//! Every transition is a single conditional `UPDATE`; it either applies in
//! full or not at all.

use super::JobDAL;
use crate::dal::models::JobUpdate;
use crate::error::QueueError;
use crate::models::job::{Job, JobOutcome, JobStatus};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// `last_error` written when a stale claim is handed back to the queue.
pub const ORPHAN_RECOVERY_ERROR: &str = "recovered orphaned claim";

/// Column changes for resolving a claimed job with `outcome`.
fn resolution(job: &Job, outcome: &JobOutcome, now: DateTime<Utc>) -> JobUpdate {
    match outcome {
        JobOutcome::Completed => JobUpdate {
            status: Some(JobStatus::Completed),
            completed_at: Some(Some(now)),
            ..Default::default()
        },
        JobOutcome::Retry {
            attempts,
            delay,
            error,
        } => {
            let retry_at = chrono::Duration::from_std(*delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(now);
            JobUpdate {
                status: Some(JobStatus::Retrying),
                attempts: Some(*attempts),
                last_error: Some(error.clone()),
                scheduled_at: Some(retry_at),
                claimed_at: Some(None),
                ..Default::default()
            }
        }
        JobOutcome::Failed { attempts, error } => JobUpdate {
            status: Some(JobStatus::Failed),
            attempts: Some(attempts.unwrap_or(job.attempts)),
            last_error: Some(error.clone()),
            completed_at: Some(Some(now)),
            ..Default::default()
        },
    }
}

impl<'a> JobDAL<'a> {
    /// Applies `outcome` to a job this worker holds in `processing`.
    ///
    /// Returns `false` when the row is no longer `processing` (already
    /// resolved, recovered or reset), in which case nothing was written.
    pub async fn resolve(
        &self,
        job: &Job,
        outcome: &JobOutcome,
        now: DateTime<Utc>,
    ) -> Result<bool, QueueError> {
        let update = resolution(job, outcome, now);
        let updated = self
            .update_where_status(job.id, JobStatus::Processing, update)
            .await?;
        Ok(updated > 0)
    }

    /// Resets a `failed` job to `pending` with zero attempts, due `now`.
    ///
    /// `last_error` and `started_at` are kept for triage.
    pub async fn reset_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let update = JobUpdate {
            status: Some(JobStatus::Pending),
            attempts: Some(0),
            scheduled_at: Some(now),
            claimed_at: Some(None),
            completed_at: Some(None),
            ..Default::default()
        };

        if self
            .update_where_status(id, JobStatus::Failed, update)
            .await?
            > 0
        {
            return self.get_by_id(id).await?.ok_or(QueueError::NotFound(id));
        }

        match self.get_by_id(id).await? {
            Some(job) => Err(QueueError::InvalidState {
                id,
                status: job.status,
            }),
            None => Err(QueueError::NotFound(id)),
        }
    }

    async fn update_where_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<usize, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.update_where_status_postgres(id, expected, update)
                .await,
            self.update_where_status_sqlite(id, expected, update)
                .await
        )
    }

    #[cfg(feature = "postgres")]
    async fn update_where_status_postgres(
        &self,
        id: Uuid,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<usize, QueueError> {
        use crate::dal::models::PgJobChangeset;
        use crate::database::schema::postgres::jobs;

        let conn = self.dal.database.get_postgres_connection().await?;
        let changeset = PgJobChangeset::from(&update);

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    jobs::table
                        .filter(jobs::id.eq(id))
                        .filter(jobs::status.eq(expected.as_str())),
                )
                .set(&changeset)
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    #[cfg(feature = "sqlite")]
    async fn update_where_status_sqlite(
        &self,
        id: Uuid,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<usize, QueueError> {
        use crate::dal::models::{uuid_to_blob, SqliteJobChangeset};
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let changeset = SqliteJobChangeset::from(&update);
        let blob = uuid_to_blob(&id);

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    jobs::table
                        .filter(jobs::id.eq(blob))
                        .filter(jobs::status.eq(expected.as_str())),
                )
                .set(&changeset)
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    /// Moves `retrying` jobs whose backoff has elapsed back to `pending`.
    pub async fn promote_due_retries(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.promote_due_retries_postgres(now).await,
            self.promote_due_retries_sqlite(now).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn promote_due_retries_postgres(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        use crate::dal::models::to_naive;
        use crate::database::schema::postgres::jobs;

        let conn = self.dal.database.get_postgres_connection().await?;
        let now = to_naive(&now);

        let promoted = conn
            .interact(move |conn| {
                diesel::update(
                    jobs::table
                        .filter(jobs::status.eq(JobStatus::Retrying.as_str()))
                        .filter(jobs::scheduled_at.le(now)),
                )
                .set(jobs::status.eq(JobStatus::Pending.as_str()))
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(promoted)
    }

    #[cfg(feature = "sqlite")]
    async fn promote_due_retries_sqlite(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        use crate::dal::models::datetime_to_string;
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let now = datetime_to_string(&now);

        let promoted = conn
            .interact(move |conn| {
                diesel::update(
                    jobs::table
                        .filter(jobs::status.eq(JobStatus::Retrying.as_str()))
                        .filter(jobs::scheduled_at.le(now)),
                )
                .set(jobs::status.eq(JobStatus::Pending.as_str()))
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(promoted)
    }

    /// Returns `processing` jobs claimed before `claimed_before` to `pending`.
    ///
    /// Such claims belong to workers that died mid-execution. Attempts are
    /// left unchanged; handlers are expected to be idempotent.
    pub async fn recover_orphaned(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.recover_orphaned_postgres(claimed_before).await,
            self.recover_orphaned_sqlite(claimed_before).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn recover_orphaned_postgres(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        use crate::dal::models::to_naive;
        use crate::database::schema::postgres::jobs;
        use chrono::NaiveDateTime;

        let conn = self.dal.database.get_postgres_connection().await?;
        let cutoff = to_naive(&claimed_before);

        let recovered = conn
            .interact(move |conn| {
                diesel::update(
                    jobs::table
                        .filter(jobs::status.eq(JobStatus::Processing.as_str()))
                        .filter(jobs::claimed_at.lt(cutoff)),
                )
                .set((
                    jobs::status.eq(JobStatus::Pending.as_str()),
                    jobs::claimed_at.eq(None::<NaiveDateTime>),
                    jobs::last_error.eq(Some(ORPHAN_RECOVERY_ERROR)),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(recovered)
    }

    #[cfg(feature = "sqlite")]
    async fn recover_orphaned_sqlite(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        use crate::dal::models::datetime_to_string;
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let cutoff = datetime_to_string(&claimed_before);

        let recovered = conn
            .interact(move |conn| {
                diesel::update(
                    jobs::table
                        .filter(jobs::status.eq(JobStatus::Processing.as_str()))
                        .filter(jobs::claimed_at.lt(cutoff)),
                )
                .set((
                    jobs::status.eq(JobStatus::Pending.as_str()),
                    jobs::claimed_at.eq(None::<String>),
                    jobs::last_error.eq(Some(ORPHAN_RECOVERY_ERROR)),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(recovered)
    }
}
