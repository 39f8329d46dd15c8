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

//! The job record and its state machine.
//!
//! ```text
//!            claim              success
//! pending ----------> processing ---------> completed
//!    ^                   |    |
//!    |  promote (due)    |    | error, attempts >= max_attempts
//!    |                   |    +-----------------------------> failed
//! retrying <-------------+                                      |
//!          error, attempts < max_attempts                       |
//!                                                               |
//! pending <-------------------- retry_failed (operator) --------+
//! ```
//!
//! A job is claimable only while `pending` with `scheduled_at <= now`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Lowest accepted priority.
pub const MIN_PRIORITY: i32 = 0;
/// Highest accepted priority. Higher priorities are served first.
pub const MAX_PRIORITY: i32 = 100;
/// Longest accepted job type, in bytes.
pub const MAX_JOB_TYPE_LEN: usize = 100;

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }

    /// `completed` and `failed` accept no further transitions except an
    /// operator retry of a failed job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    /// Opaque document interpreted only by the handler for `job_type`.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    /// Earliest time the job may be claimed. Rewritten on every retry.
    pub scheduled_at: DateTime<Utc>,
    /// Time of the most recent claim; used to detect orphaned claims.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Time of the first claim.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Decodes the payload into a handler-owned type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }
}

/// Producer input for [`crate::JobQueue::enqueue`] and
/// [`crate::JobQueue::enqueue_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    /// `None` means "now".
    pub scheduled_at: Option<DateTime<Utc>>,
    /// `None` means the queue's configured default.
    pub max_attempts: Option<i32>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: MIN_PRIORITY,
            scheduled_at: None,
            max_attempts: None,
        }
    }

    /// Builds a job from any serializable payload.
    pub fn with_payload<T: Serialize>(
        job_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(job_type, serde_json::to_value(payload)?))
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// The result a worker reports for a claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// Re-schedule after `delay`; the caller has already counted the attempt.
    Retry {
        attempts: i32,
        delay: Duration,
        error: String,
    },
    /// Terminal failure. `attempts` is `None` when the failure was not an
    /// execution attempt (for example a missing handler).
    Failed {
        attempts: Option<i32>,
        error: String,
    },
}

/// Aggregate counts over a reporting window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: i64,
    pub processing: i64,
    pub retrying: i64,
    pub completed: i64,
    pub failed: i64,
    /// Mean `completed_at - started_at` over completed jobs, in seconds.
    pub avg_duration_seconds: f64,
}

impl JobStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.retrying + self.completed + self.failed
    }

    pub fn record(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Retrying => self.retrying += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }
}
