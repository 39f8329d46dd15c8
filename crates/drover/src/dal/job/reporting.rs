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

//! Read-only queries used by the mover and the monitoring surface.

use super::{claimable_statuses, JobDAL};
use crate::dispatcher::DispatchHint;
use crate::error::QueueError;
use crate::models::job::{Job, JobStats, JobStatus};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

#[derive(Debug, QueryableByName)]
struct AvgDuration {
    #[diesel(sql_type = diesel::sql_types::Double)]
    avg_duration: f64,
}

fn fold_counts(counts: Vec<(String, i64)>, avg_duration_seconds: f64) -> Result<JobStats, QueueError> {
    let mut stats = JobStats {
        avg_duration_seconds,
        ..Default::default()
    };
    for (status, count) in counts {
        let status: JobStatus = status.parse().map_err(QueueError::CorruptRow)?;
        stats.record(status, count);
    }
    Ok(stats)
}

impl<'a> JobDAL<'a> {
    /// Ids of claimable jobs in claim order, at most `limit`.
    pub async fn list_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DispatchHint>, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.list_ready_postgres(now, limit).await,
            self.list_ready_sqlite(now, limit).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn list_ready_postgres(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DispatchHint>, QueueError> {
        use crate::dal::models::{from_naive, to_naive};
        use crate::database::schema::postgres::jobs;

        let conn = self.dal.database.get_postgres_connection().await?;
        let now = to_naive(&now);
        let limit = limit as i64;

        let rows: Vec<(uuid::Uuid, i32, chrono::NaiveDateTime)> = conn
            .interact(move |conn| {
                jobs::table
                    .filter(jobs::status.eq_any(claimable_statuses()))
                    .filter(jobs::scheduled_at.le(now))
                    .order((jobs::priority.desc(), jobs::scheduled_at.asc()))
                    .select((jobs::id, jobs::priority, jobs::scheduled_at))
                    .limit(limit)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(rows
            .into_iter()
            .map(|(id, priority, scheduled_at)| DispatchHint {
                id,
                priority,
                scheduled_at: from_naive(scheduled_at),
            })
            .collect())
    }

    #[cfg(feature = "sqlite")]
    async fn list_ready_sqlite(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DispatchHint>, QueueError> {
        use crate::dal::models::{blob_to_uuid, datetime_to_string, string_to_datetime};
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let now = datetime_to_string(&now);
        let limit = limit as i64;

        let rows: Vec<(Vec<u8>, i32, String)> = conn
            .interact(move |conn| {
                jobs::table
                    .filter(jobs::status.eq_any(claimable_statuses()))
                    .filter(jobs::scheduled_at.le(now))
                    .order((jobs::priority.desc(), jobs::scheduled_at.asc()))
                    .select((jobs::id, jobs::priority, jobs::scheduled_at))
                    .limit(limit)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        rows.into_iter()
            .map(|(id, priority, scheduled_at)| {
                Ok(DispatchHint {
                    id: blob_to_uuid(&id)?,
                    priority,
                    scheduled_at: string_to_datetime(&scheduled_at)?,
                })
            })
            .collect()
    }

    /// Terminally failed jobs, most recently failed first.
    pub async fn list_failed(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.list_failed_postgres(limit).await,
            self.list_failed_sqlite(limit).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn list_failed_postgres(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        use crate::dal::models::PgJobRow;
        use crate::database::schema::postgres::jobs;

        let conn = self.dal.database.get_postgres_connection().await?;
        let limit = limit as i64;

        let rows: Vec<PgJobRow> = conn
            .interact(move |conn| {
                jobs::table
                    .filter(jobs::status.eq(JobStatus::Failed.as_str()))
                    .order((jobs::completed_at.desc(), jobs::created_at.desc()))
                    .select(PgJobRow::as_select())
                    .limit(limit)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Job::try_from).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn list_failed_sqlite(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        use crate::dal::models::SqliteJobRow;
        use crate::database::schema::sqlite::jobs;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let limit = limit as i64;

        let rows: Vec<SqliteJobRow> = conn
            .interact(move |conn| {
                jobs::table
                    .filter(jobs::status.eq(JobStatus::Failed.as_str()))
                    .order((jobs::completed_at.desc(), jobs::created_at.desc()))
                    .select(SqliteJobRow::as_select())
                    .limit(limit)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Job::try_from).collect()
    }

    /// Counts by status and mean completed-job duration for jobs created
    /// after `since`.
    pub async fn stats(&self, since: DateTime<Utc>) -> Result<JobStats, QueueError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.stats_postgres(since).await,
            self.stats_sqlite(since).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn stats_postgres(&self, since: DateTime<Utc>) -> Result<JobStats, QueueError> {
        use crate::dal::models::to_naive;
        use crate::database::schema::postgres::jobs;
        use diesel::dsl::count_star;

        let conn = self.dal.database.get_postgres_connection().await?;
        let since = to_naive(&since);

        let (counts, avg) = conn
            .interact(move |conn| -> QueryResult<(Vec<(String, i64)>, AvgDuration)> {
                let counts = jobs::table
                    .filter(jobs::created_at.gt(since))
                    .group_by(jobs::status)
                    .select((jobs::status, count_star()))
                    .load::<(String, i64)>(conn)?;

                let avg = diesel::sql_query(
                    "SELECT COALESCE(AVG(EXTRACT(EPOCH FROM (completed_at - started_at))), 0)::float8 \
                     AS avg_duration \
                     FROM jobs \
                     WHERE status = 'completed' \
                       AND started_at IS NOT NULL \
                       AND completed_at IS NOT NULL \
                       AND created_at > $1",
                )
                .bind::<diesel::sql_types::Timestamp, _>(since)
                .get_result::<AvgDuration>(conn)?;

                Ok((counts, avg))
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        fold_counts(counts, avg.avg_duration)
    }

    #[cfg(feature = "sqlite")]
    async fn stats_sqlite(&self, since: DateTime<Utc>) -> Result<JobStats, QueueError> {
        use crate::dal::models::datetime_to_string;
        use crate::database::schema::sqlite::jobs;
        use diesel::dsl::count_star;

        let conn = self.dal.database.get_sqlite_connection().await?;
        let since = datetime_to_string(&since);

        let (counts, avg) = conn
            .interact(move |conn| -> QueryResult<(Vec<(String, i64)>, AvgDuration)> {
                let counts = jobs::table
                    .filter(jobs::created_at.gt(since.clone()))
                    .group_by(jobs::status)
                    .select((jobs::status, count_star()))
                    .load::<(String, i64)>(conn)?;

                let avg = diesel::sql_query(
                    "SELECT COALESCE(AVG((julianday(completed_at) - julianday(started_at)) * 86400.0), 0.0) \
                     AS avg_duration \
                     FROM jobs \
                     WHERE status = 'completed' \
                       AND started_at IS NOT NULL \
                       AND completed_at IS NOT NULL \
                       AND created_at > ?",
                )
                .bind::<diesel::sql_types::Text, _>(since)
                .get_result::<AvgDuration>(conn)?;

                Ok((counts, avg))
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        fold_counts(counts, avg.avg_duration)
    }
}
