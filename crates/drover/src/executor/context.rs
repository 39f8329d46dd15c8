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

use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::job::Job;

/// Execution metadata handed to a handler alongside its job.
///
/// The deadline is the point after which the worker abandons the attempt.
/// Long-running handlers can check [`JobContext::remaining`] to stop early,
/// or race their work against [`JobContext::cancelled`].
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: Uuid,
    job_type: String,
    worker_id: usize,
    attempt: i32,
    deadline: Instant,
}

impl JobContext {
    pub fn new(job: &Job, worker_id: usize, timeout: Duration) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            worker_id,
            attempt: job.attempts + 1,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// One-based number of the attempt in progress.
    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the worker gives up on this attempt.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Completes when the deadline passes.
    pub async fn cancelled(&self) {
        tokio::time::sleep_until(self.deadline).await
    }
}
