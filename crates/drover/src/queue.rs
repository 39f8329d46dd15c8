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

//! The Queue Store.
//!
//! [`JobQueue`] owns every mutation of job rows. Producers enqueue through
//! it, workers claim and resolve through it, and the mover and monitoring
//! surface use its maintenance and reporting operations.
//!
//! Claiming is two-tier:
//!
//! 1. **Fast path**: pop a hint from the optional [`DispatchChannel`] and
//!    conditionally claim that id. A stale hint (already claimed, resolved,
//!    not yet due or not yet visible) is discarded.
//! 2. **Reliable path**: claim the best eligible row straight from the table.
//!    Eligible means due and either `pending` or `retrying`.
//!
//! Dispatch-channel failures are logged and never surface to callers.

use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dal::DAL;
use crate::database::Database;
use crate::dispatcher::{DispatchChannel, DispatchHint};
use crate::error::QueueError;
use crate::models::job::{
    Job, JobOutcome, JobStats, JobStatus, NewJob, MAX_JOB_TYPE_LEN, MAX_PRIORITY, MIN_PRIORITY,
};

/// Attempt ceiling used when neither the producer nor the configuration
/// supplies one.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// How many stale hints a single claim will discard before falling back to
/// the reliable path.
const MAX_STALE_HINTS_PER_CLAIM: usize = 8;

#[derive(Clone)]
pub struct JobQueue {
    dal: DAL,
    dispatch: Option<Arc<dyn DispatchChannel>>,
    default_max_attempts: i32,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("dal", &self.dal)
            .field("dispatch", &self.dispatch.is_some())
            .field("default_max_attempts", &self.default_max_attempts)
            .finish()
    }
}

impl JobQueue {
    /// Creates a queue that relies solely on the reliable claim path.
    pub fn new(database: Database) -> Self {
        Self {
            dal: DAL::new(database),
            dispatch: None,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_dispatch_channel(mut self, channel: Arc<dyn DispatchChannel>) -> Self {
        self.dispatch = Some(channel);
        self
    }

    pub fn with_default_max_attempts(mut self, max_attempts: i32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    pub fn default_max_attempts(&self) -> i32 {
        self.default_max_attempts
    }

    pub fn has_dispatch_channel(&self) -> bool {
        self.dispatch.is_some()
    }

    fn build(&self, new_job: NewJob) -> Result<Job, QueueError> {
        if new_job.job_type.is_empty() || new_job.job_type.len() > MAX_JOB_TYPE_LEN {
            return Err(QueueError::InvalidJobType(new_job.job_type));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&new_job.priority) {
            return Err(QueueError::InvalidPriority(new_job.priority));
        }
        let max_attempts = new_job.max_attempts.unwrap_or(self.default_max_attempts);
        if max_attempts < 1 {
            return Err(QueueError::InvalidMaxAttempts(max_attempts));
        }

        // The store keeps microseconds; the returned job must match a reload.
        let now = Utc::now().trunc_subsecs(6);
        Ok(Job {
            id: Uuid::new_v4(),
            job_type: new_job.job_type,
            payload: new_job.payload,
            status: JobStatus::Pending,
            priority: new_job.priority,
            attempts: 0,
            max_attempts,
            last_error: None,
            scheduled_at: new_job.scheduled_at.map_or(now, |at| at.trunc_subsecs(6)),
            claimed_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        })
    }

    /// Inserts a `pending` job and, when it is already due, publishes a
    /// dispatch hint after the insert has committed.
    pub async fn enqueue(&self, new_job: NewJob) -> Result<Job, QueueError> {
        let job = self.build(new_job)?;
        let job = self.dal.job().create(job).await?;

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority,
            "Job enqueued"
        );

        self.publish_if_due(&job).await;
        Ok(job)
    }

    /// Inserts all jobs in one transaction. Any invalid element, or any
    /// failed insert, fails the whole batch and publishes nothing.
    pub async fn enqueue_batch(&self, new_jobs: Vec<NewJob>) -> Result<Vec<Job>, QueueError> {
        let jobs = new_jobs
            .into_iter()
            .map(|new_job| self.build(new_job))
            .collect::<Result<Vec<_>, _>>()?;

        let jobs = self.dal.job().create_batch(jobs).await?;
        info!(count = jobs.len(), "Job batch enqueued");

        for job in &jobs {
            self.publish_if_due(job).await;
        }
        Ok(jobs)
    }

    /// Claims one job for exclusive processing, or returns `None` when
    /// nothing is eligible.
    pub async fn claim(&self) -> Result<Option<Job>, QueueError> {
        if let Some(job) = self.claim_from_hints().await? {
            return Ok(Some(job));
        }

        let claimed = self.dal.job().claim_next(Utc::now()).await?;
        if let Some(ref job) = claimed {
            debug!(job_id = %job.id, job_type = %job.job_type, "Claimed job via table scan");
        }
        Ok(claimed)
    }

    async fn claim_from_hints(&self) -> Result<Option<Job>, QueueError> {
        let Some(channel) = &self.dispatch else {
            return Ok(None);
        };

        for _ in 0..MAX_STALE_HINTS_PER_CLAIM {
            let id = match channel.pop().await {
                Ok(Some(id)) => id,
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!("Dispatch channel pop failed, falling back to table scan: {}", e);
                    return Ok(None);
                }
            };

            match self.dal.job().claim_by_id(id, Utc::now()).await? {
                Some(job) => {
                    debug!(job_id = %job.id, job_type = %job.job_type, "Claimed job via dispatch hint");
                    return Ok(Some(job));
                }
                None => debug!(job_id = %id, "Discarding stale dispatch hint"),
            }
        }
        Ok(None)
    }

    /// Records the outcome of a claimed job.
    ///
    /// Returns `false` when the job was no longer `processing`; the call is
    /// then a no-op.
    pub async fn resolve(&self, job: &Job, outcome: JobOutcome) -> Result<bool, QueueError> {
        let applied = self.dal.job().resolve(job, &outcome, Utc::now()).await?;
        if !applied {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                "Resolve ignored: job is no longer processing"
            );
        }
        Ok(applied)
    }

    /// Due `pending` jobs in claim order, at most `limit`.
    pub async fn list_ready(&self, limit: usize) -> Result<Vec<DispatchHint>, QueueError> {
        self.dal.job().list_ready(Utc::now(), limit).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Job, QueueError> {
        self.dal
            .job()
            .get_by_id(id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn list_failed(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        self.dal.job().list_failed(limit).await
    }

    /// Counts and mean duration over jobs created in the last 24 hours.
    pub async fn stats(&self) -> Result<JobStats, QueueError> {
        self.dal
            .job()
            .stats(Utc::now() - chrono::Duration::hours(24))
            .await
    }

    /// Resets a `failed` job to `pending` with zero attempts and makes it
    /// immediately claimable.
    pub async fn retry_failed(&self, id: Uuid) -> Result<Job, QueueError> {
        let job = self.dal.job().reset_failed(id, Utc::now()).await?;
        info!(job_id = %job.id, job_type = %job.job_type, "Failed job reset for retry");
        self.publish(DispatchHint::from(&job)).await;
        Ok(job)
    }

    /// Moves `retrying` jobs whose backoff has elapsed back to `pending`.
    pub async fn promote_due_retries(&self) -> Result<usize, QueueError> {
        let promoted = self.dal.job().promote_due_retries(Utc::now()).await?;
        if promoted > 0 {
            debug!(count = promoted, "Promoted due retries");
        }
        Ok(promoted)
    }

    /// Returns claims older than `stale_after` to `pending`.
    pub async fn recover_orphaned(&self, stale_after: std::time::Duration) -> Result<usize, QueueError> {
        let Some(cutoff) = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return Ok(0);
        };
        let recovered = self.dal.job().recover_orphaned(cutoff).await?;
        if recovered > 0 {
            warn!(count = recovered, "Recovered orphaned job claims");
        }
        Ok(recovered)
    }

    /// Publishes a hint, logging and swallowing channel failures.
    pub async fn publish(&self, hint: DispatchHint) {
        if let Some(channel) = &self.dispatch {
            let id = hint.id;
            if let Err(e) = channel.publish(hint).await {
                warn!(job_id = %id, "Failed to publish dispatch hint: {}", e);
            }
        }
    }

    async fn publish_if_due(&self, job: &Job) {
        if job.scheduled_at <= Utc::now() {
            self.publish(DispatchHint::from(job)).await;
        }
    }

    /// Waits for a dispatch hint, or for `max_wait` when there is no channel.
    pub async fn wait_for_work(&self, max_wait: std::time::Duration) {
        match &self.dispatch {
            Some(channel) => channel.wait_for_work(max_wait).await,
            None => tokio::time::sleep(max_wait).await,
        }
    }
}
