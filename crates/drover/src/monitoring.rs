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

//! Operator-facing view of the queue: 24-hour statistics, failed-job
//! triage and manual retry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::job::{Job, JobStats};
use crate::queue::JobQueue;

pub const DEFAULT_FAILED_LIMIT: usize = 50;
pub const MAX_FAILED_LIMIT: usize = 500;

/// Statistics over jobs created in the last 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatsReport {
    pub pending: i64,
    pub processing: i64,
    pub retrying: i64,
    pub completed: i64,
    pub failed: i64,
    pub avg_duration_seconds: f64,
    pub total_last_24h: i64,
    /// `completed / total_last_24h`, or `0.0` when the window is empty.
    pub success_rate: f64,
}

impl From<JobStats> for JobStatsReport {
    fn from(stats: JobStats) -> Self {
        let total = stats.total();
        let success_rate = if total > 0 {
            stats.completed as f64 / total as f64
        } else {
            0.0
        };
        Self {
            pending: stats.pending,
            processing: stats.processing,
            retrying: stats.retrying,
            completed: stats.completed,
            failed: stats.failed,
            avg_duration_seconds: stats.avg_duration_seconds,
            total_last_24h: total,
            success_rate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobMonitor {
    queue: JobQueue,
}

impl JobMonitor {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    pub async fn stats(&self) -> Result<JobStatsReport, QueueError> {
        Ok(self.queue.stats().await?.into())
    }

    /// Most recent terminal failures. `limit` defaults to 50 and is capped
    /// at 500.
    pub async fn list_failed(&self, limit: Option<usize>) -> Result<Vec<Job>, QueueError> {
        self.queue.list_failed(clamp_failed_limit(limit)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Job, QueueError> {
        self.queue.get_by_id(id).await
    }

    pub async fn retry_failed(&self, id: Uuid) -> Result<Job, QueueError> {
        self.queue.retry_failed(id).await
    }
}

fn clamp_failed_limit(limit: Option<usize>) -> usize {
    match limit {
        None | Some(0) => DEFAULT_FAILED_LIMIT,
        Some(n) => n.min(MAX_FAILED_LIMIT),
    }
}
