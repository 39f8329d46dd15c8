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

//! Fast dispatch channel.
//!
//! The channel is a non-durable side index of job ids that are probably
//! claimable. It exists only to cut polling latency; the `jobs` table stays
//! the source of truth and every hint is verified by a conditional claim.
//!
//! Hints carry the job's priority and `scheduled_at`, and every implementation
//! pops them in the same order the reliable claim path uses
//! (`priority DESC, scheduled_at ASC`), so both paths agree on ordering.
//!
//! - [`MemoryDispatchChannel`]: in-process binary heap, for single-process deployments
//! - [`RedisDispatchChannel`]: Redis sorted set shared by several processes (feature `redis`)

mod memory;
#[cfg(feature = "redis")]
mod redis_channel;

pub use memory::MemoryDispatchChannel;
#[cfg(feature = "redis")]
pub use redis_channel::RedisDispatchChannel;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::job::Job;

/// A suggestion that a job may be claimable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchHint {
    pub id: Uuid,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
}

impl From<&Job> for DispatchHint {
    fn from(job: &Job) -> Self {
        DispatchHint {
            id: job.id,
            priority: job.priority,
            scheduled_at: job.scheduled_at,
        }
    }
}

/// "Greater" means "served first": higher priority, then earlier
/// `scheduled_at`, then lower id.
impl Ord for DispatchHint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.scheduled_at.cmp(&self.scheduled_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for DispatchHint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A best-effort, priority-ordered index of claimable job ids.
#[async_trait]
pub trait DispatchChannel: Send + Sync {
    /// Adds a hint. Publishing an id that is already queued is a no-op.
    async fn publish(&self, hint: DispatchHint) -> Result<(), DispatchError>;

    /// Removes and returns the id that should be served first, if any.
    async fn pop(&self) -> Result<Option<Uuid>, DispatchError>;

    /// Waits until a hint may be available or `max_wait` elapses.
    ///
    /// The default implementation simply sleeps; channels that can observe
    /// publishes wake early.
    async fn wait_for_work(&self, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }
}
