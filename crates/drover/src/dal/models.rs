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

//! Backend-specific row structs and their conversions to [`Job`].
//!
//! PostgreSQL stores native UUIDs and `TIMESTAMP` (UTC, no zone). SQLite
//! stores ids as 16-byte BLOBs and timestamps as fixed-width RFC 3339 text.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::job::{Job, JobStatus};

fn parse_status(status: &str) -> Result<JobStatus, QueueError> {
    status.parse().map_err(QueueError::CorruptRow)
}

fn parse_payload(payload: &str) -> Result<serde_json::Value, QueueError> {
    serde_json::from_str(payload)
        .map_err(|e| QueueError::CorruptRow(format!("payload is not valid JSON: {}", e)))
}

/// A backend-neutral set of column changes applied by a state transition.
///
/// `None` leaves a column untouched. For nullable columns, `Some(None)`
/// writes `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub attempts: Option<i32>,
    pub last_error: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[cfg(feature = "postgres")]
pub use self::postgres::*;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use crate::database::schema::postgres::jobs;
    use chrono::NaiveDateTime;

    #[derive(Debug, Queryable, Selectable)]
    #[diesel(table_name = jobs)]
    #[diesel(check_for_backend(diesel::pg::Pg))]
    pub struct PgJobRow {
        pub id: Uuid,
        pub job_type: String,
        pub payload: String,
        pub status: String,
        pub priority: i32,
        pub attempts: i32,
        pub max_attempts: i32,
        pub last_error: Option<String>,
        pub scheduled_at: NaiveDateTime,
        pub claimed_at: Option<NaiveDateTime>,
        pub started_at: Option<NaiveDateTime>,
        pub completed_at: Option<NaiveDateTime>,
        pub created_at: NaiveDateTime,
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = jobs)]
    pub struct NewPgJobRow {
        pub id: Uuid,
        pub job_type: String,
        pub payload: String,
        pub status: String,
        pub priority: i32,
        pub attempts: i32,
        pub max_attempts: i32,
        pub scheduled_at: NaiveDateTime,
        pub created_at: NaiveDateTime,
    }

    #[derive(Debug, AsChangeset)]
    #[diesel(table_name = jobs)]
    pub struct PgJobChangeset {
        pub status: Option<String>,
        pub attempts: Option<i32>,
        pub last_error: Option<String>,
        pub scheduled_at: Option<NaiveDateTime>,
        pub claimed_at: Option<Option<NaiveDateTime>>,
        pub completed_at: Option<Option<NaiveDateTime>>,
    }

    impl From<&JobUpdate> for PgJobChangeset {
        fn from(update: &JobUpdate) -> Self {
            PgJobChangeset {
                status: update.status.map(|s| s.as_str().to_string()),
                attempts: update.attempts,
                last_error: update.last_error.clone(),
                scheduled_at: update.scheduled_at.as_ref().map(to_naive),
                claimed_at: update.claimed_at.map(|c| c.as_ref().map(to_naive)),
                completed_at: update.completed_at.map(|c| c.as_ref().map(to_naive)),
            }
        }
    }

    /// Postgres `TIMESTAMP` columns hold UTC wall-clock time.
    pub fn to_naive(dt: &DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    pub fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    impl TryFrom<PgJobRow> for Job {
        type Error = QueueError;

        fn try_from(row: PgJobRow) -> Result<Self, Self::Error> {
            Ok(Job {
                id: row.id,
                job_type: row.job_type,
                payload: parse_payload(&row.payload)?,
                status: parse_status(&row.status)?,
                priority: row.priority,
                attempts: row.attempts,
                max_attempts: row.max_attempts,
                last_error: row.last_error,
                scheduled_at: from_naive(row.scheduled_at),
                claimed_at: row.claimed_at.map(from_naive),
                started_at: row.started_at.map(from_naive),
                completed_at: row.completed_at.map(from_naive),
                created_at: from_naive(row.created_at),
            })
        }
    }

    impl NewPgJobRow {
        pub fn from_job(job: &Job) -> Result<Self, QueueError> {
            Ok(NewPgJobRow {
                id: job.id,
                job_type: job.job_type.clone(),
                payload: serde_json::to_string(&job.payload)?,
                status: job.status.as_str().to_string(),
                priority: job.priority,
                attempts: job.attempts,
                max_attempts: job.max_attempts,
                scheduled_at: to_naive(&job.scheduled_at),
                created_at: to_naive(&job.created_at),
            })
        }
    }
}

// ============================================================================
// SQLite
// ============================================================================

#[cfg(feature = "sqlite")]
pub use self::sqlite::*;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use crate::database::schema::sqlite::jobs;

    #[derive(Debug, Queryable, Selectable)]
    #[diesel(table_name = jobs)]
    #[diesel(check_for_backend(diesel::sqlite::Sqlite))]
    pub struct SqliteJobRow {
        pub id: Vec<u8>,
        pub job_type: String,
        pub payload: String,
        pub status: String,
        pub priority: i32,
        pub attempts: i32,
        pub max_attempts: i32,
        pub last_error: Option<String>,
        pub scheduled_at: String,
        pub claimed_at: Option<String>,
        pub started_at: Option<String>,
        pub completed_at: Option<String>,
        pub created_at: String,
    }

    #[derive(Debug, Insertable)]
    #[diesel(table_name = jobs)]
    pub struct NewSqliteJobRow {
        pub id: Vec<u8>,
        pub job_type: String,
        pub payload: String,
        pub status: String,
        pub priority: i32,
        pub attempts: i32,
        pub max_attempts: i32,
        pub scheduled_at: String,
        pub created_at: String,
    }

    #[derive(Debug, AsChangeset)]
    #[diesel(table_name = jobs)]
    pub struct SqliteJobChangeset {
        pub status: Option<String>,
        pub attempts: Option<i32>,
        pub last_error: Option<String>,
        pub scheduled_at: Option<String>,
        pub claimed_at: Option<Option<String>>,
        pub completed_at: Option<Option<String>>,
    }

    impl From<&JobUpdate> for SqliteJobChangeset {
        fn from(update: &JobUpdate) -> Self {
            SqliteJobChangeset {
                status: update.status.map(|s| s.as_str().to_string()),
                attempts: update.attempts,
                last_error: update.last_error.clone(),
                scheduled_at: update.scheduled_at.as_ref().map(datetime_to_string),
                claimed_at: update.claimed_at.map(|c| c.as_ref().map(datetime_to_string)),
                completed_at: update.completed_at.map(|c| c.as_ref().map(datetime_to_string)),
            }
        }
    }

    pub fn uuid_to_blob(uuid: &Uuid) -> Vec<u8> {
        uuid.as_bytes().to_vec()
    }

    pub fn blob_to_uuid(blob: &[u8]) -> Result<Uuid, QueueError> {
        Uuid::from_slice(blob).map_err(|e| QueueError::CorruptRow(format!("invalid id: {}", e)))
    }

    /// Fixed-width UTC form (`2025-01-01T00:00:00.000000Z`), so lexical
    /// comparison in SQL matches chronological order.
    pub fn datetime_to_string(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, QueueError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| QueueError::CorruptRow(format!("invalid timestamp '{}': {}", s, e)))
    }

    fn optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, QueueError> {
        s.as_deref().map(string_to_datetime).transpose()
    }

    impl TryFrom<SqliteJobRow> for Job {
        type Error = QueueError;

        fn try_from(row: SqliteJobRow) -> Result<Self, Self::Error> {
            Ok(Job {
                id: blob_to_uuid(&row.id)?,
                job_type: row.job_type,
                payload: parse_payload(&row.payload)?,
                status: parse_status(&row.status)?,
                priority: row.priority,
                attempts: row.attempts,
                max_attempts: row.max_attempts,
                last_error: row.last_error,
                scheduled_at: string_to_datetime(&row.scheduled_at)?,
                claimed_at: optional_datetime(row.claimed_at)?,
                started_at: optional_datetime(row.started_at)?,
                completed_at: optional_datetime(row.completed_at)?,
                created_at: string_to_datetime(&row.created_at)?,
            })
        }
    }

    impl NewSqliteJobRow {
        pub fn from_job(job: &Job) -> Result<Self, QueueError> {
            Ok(NewSqliteJobRow {
                id: uuid_to_blob(&job.id),
                job_type: job.job_type.clone(),
                payload: serde_json::to_string(&job.payload)?,
                status: job.status.as_str().to_string(),
                priority: job.priority,
                attempts: job.attempts,
                max_attempts: job.max_attempts,
                scheduled_at: datetime_to_string(&job.scheduled_at),
                created_at: datetime_to_string(&job.created_at),
            })
        }
    }

}
