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

//! # Ready-Queue Mover
//!
//! Periodic sweep that keeps the fast dispatch channel in step with the
//! `jobs` table. Each sweep:
//!
//! 1. promotes `retrying` jobs whose backoff has elapsed back to `pending`,
//! 2. returns stale `processing` claims to `pending` when orphan recovery
//!    is enabled,
//! 3. publishes a hint for up to `batch_size` claimable jobs.
//!
//! Re-publishing a hint for a job that is already in the channel is
//! harmless: channels de-duplicate by id and every hint is verified at claim
//! time. Without a dispatch channel the sweep still performs steps 1 and 2.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::queue::JobQueue;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub promoted: usize,
    pub recovered: usize,
    pub published: usize,
}

pub struct ReadyQueueMover {
    queue: JobQueue,
    interval: Duration,
    batch_size: usize,
    orphan_after: Option<Duration>,
}

impl ReadyQueueMover {
    pub fn new(queue: JobQueue, interval: Duration, batch_size: usize) -> Self {
        Self {
            queue,
            interval,
            batch_size,
            orphan_after: None,
        }
    }

    /// Enables orphan recovery for claims older than `stale_after`.
    pub fn with_orphan_recovery(mut self, stale_after: Duration) -> Self {
        self.orphan_after = Some(stale_after);
        self
    }

    pub async fn sweep(&self) -> Result<SweepReport, QueueError> {
        let promoted = self.queue.promote_due_retries().await?;

        let recovered = match self.orphan_after {
            Some(stale_after) => self.queue.recover_orphaned(stale_after).await?,
            None => 0,
        };

        let mut published = 0;
        if self.queue.has_dispatch_channel() {
            for hint in self.queue.list_ready(self.batch_size).await? {
                self.queue.publish(hint).await;
                published += 1;
            }
        }

        Ok(SweepReport {
            promoted,
            recovered,
            published,
        })
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Ready-queue mover started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(report) if report != SweepReport::default() => {
                            debug!(
                                promoted = report.promoted,
                                recovered = report.recovered,
                                published = report.published,
                                "Mover sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Mover sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Ready-queue mover stopped");
    }
}
