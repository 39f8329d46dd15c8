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

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::JobContext;
use crate::models::job::{Job, JobOutcome};
use crate::queue::JobQueue;
use crate::registry::HandlerRegistry;
use crate::retry::{HandlerError, RetryDecision, RetryPolicy};

/// Per-worker tuning shared by every worker in a pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
        }
    }
}

pub struct Worker {
    id: usize,
    queue: JobQueue,
    registry: Arc<HandlerRegistry>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: JobQueue,
        registry: Arc<HandlerRegistry>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            queue,
            registry,
            settings,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Store errors during claim are logged and followed by a normal poll
    /// wait; they never end the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = self.id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.claim().await {
                Ok(Some(job)) => {
                    self.process(job).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!(worker_id = self.id, "Failed to claim job: {}", e),
            }

            tokio::select! {
                _ = self.queue.wait_for_work(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Executes a claimed job and records its outcome.
    pub async fn process(&self, job: Job) {
        debug!(
            worker_id = self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            "Processing job"
        );

        let outcome = self.execute(&job).await;
        match &outcome {
            JobOutcome::Completed => info!(
                worker_id = self.id,
                job_id = %job.id,
                job_type = %job.job_type,
                "Job completed"
            ),
            JobOutcome::Retry {
                attempts,
                delay,
                error,
            } => warn!(
                worker_id = self.id,
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = *attempts,
                delay_secs = delay.as_secs(),
                "Job failed, will retry: {}",
                error
            ),
            JobOutcome::Failed { attempts, error } => error!(
                worker_id = self.id,
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = attempts.unwrap_or(job.attempts),
                "Job failed permanently: {}",
                error
            ),
        }

        if let Err(e) = self.queue.resolve(&job, outcome).await {
            error!(
                worker_id = self.id,
                job_id = %job.id,
                "Failed to resolve job: {}",
                e
            );
        }
    }

    async fn execute(&self, job: &Job) -> JobOutcome {
        let Some(handler) = self.registry.lookup(&job.job_type) else {
            return JobOutcome::Failed {
                attempts: None,
                error: format!("no handler registered for job type '{}'", job.job_type),
            };
        };

        let ctx = JobContext::new(job, self.id, self.settings.job_timeout);
        let owned = job.clone();
        let mut task = tokio::spawn(async move { handler.handle(ctx, owned).await });

        let waited = tokio::time::timeout(self.settings.job_timeout, &mut task).await;
        let result = match waited {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(HandlerError::transient(panic_message(join_error))),
            Err(_) => {
                task.abort();
                Err(HandlerError::transient(format!(
                    "job timed out after {:?}",
                    self.settings.job_timeout
                )))
            }
        };

        let attempts = job.attempts + 1;
        match result {
            Ok(()) => JobOutcome::Completed,
            Err(err) => match self
                .settings
                .retry_policy
                .decide(attempts, job.max_attempts, &err)
            {
                RetryDecision::Retry(delay) => JobOutcome::Retry {
                    attempts,
                    delay,
                    error: err.to_string(),
                },
                RetryDecision::Fail => JobOutcome::Failed {
                    attempts: Some(attempts),
                    error: err.to_string(),
                },
            },
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return format!("handler task cancelled: {}", err);
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", msg)
    } else {
        "handler panicked".to_string()
    }
}
