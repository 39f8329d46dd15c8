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

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::CronSchedule;
use crate::error::CronError;
use crate::models::job::NewJob;
use crate::queue::JobQueue;

/// A recurring producer: on every trigger of `schedule`, enqueue one job of
/// `job_type` with a fixed payload.
#[derive(Debug, Clone)]
pub struct CronEntry {
    pub schedule: CronSchedule,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
}

impl CronEntry {
    pub fn new(
        expression: &str,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Self, CronError> {
        Ok(Self {
            schedule: CronSchedule::parse(expression)?,
            job_type: job_type.into(),
            payload,
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn to_new_job(&self) -> NewJob {
        NewJob::new(self.job_type.clone(), self.payload.clone()).priority(self.priority)
    }
}

/// Drives a fixed set of [`CronEntry`]s.
///
/// Triggers missed while the process was down, or while an enqueue was in
/// progress, are not replayed: after each trigger the next run is computed
/// from the current time.
pub struct CronScheduler {
    entries: Vec<CronEntry>,
    queue: JobQueue,
}

impl CronScheduler {
    pub fn new(queue: JobQueue, entries: Vec<CronEntry>) -> Self {
        Self { entries, queue }
    }

    pub fn entries(&self) -> &[CronEntry] {
        &self.entries
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(entries = self.entries.len(), "Cron scheduler started");

        let start = Utc::now();
        let mut next_runs: Vec<Option<DateTime<Utc>>> = self
            .entries
            .iter()
            .map(|entry| self.next_run(entry, start))
            .collect();

        loop {
            let Some(wake_at) = next_runs.iter().flatten().min().copied() else {
                debug!("No upcoming cron triggers, waiting for shutdown");
                let _ = shutdown.wait_for(|stop| *stop).await;
                break;
            };

            let sleep_for = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let now = Utc::now();
            for (entry, next_run) in self.entries.iter().zip(next_runs.iter_mut()) {
                if next_run.is_some_and(|due| due <= now) {
                    self.fire(entry).await;
                    *next_run = self.next_run(entry, now);
                }
            }
        }

        info!("Cron scheduler stopped");
    }

    async fn fire(&self, entry: &CronEntry) {
        match self.queue.enqueue(entry.to_new_job()).await {
            Ok(job) => debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                schedule = %entry.schedule,
                "Cron job enqueued"
            ),
            Err(e) => warn!(
                job_type = %entry.job_type,
                schedule = %entry.schedule,
                "Failed to enqueue cron job: {}",
                e
            ),
        }
    }

    fn next_run(&self, entry: &CronEntry, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match entry.schedule.next_after(after) {
            Ok(next) => Some(next),
            Err(e) => {
                warn!(job_type = %entry.job_type, "Cron entry disabled: {}", e);
                None
            }
        }
    }
}
