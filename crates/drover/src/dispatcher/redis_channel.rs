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

//! Redis-backed dispatch channel shared by several worker processes.
//!
//! Hints live in a sorted set. The score packs `(100 - priority)` above the
//! `scheduled_at` millisecond timestamp, so `ZPOPMIN` returns the highest
//! priority first and the earliest job within a priority. `ZADD NX` keeps one
//! entry per id.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{DispatchChannel, DispatchHint};
use crate::error::DispatchError;
use crate::models::job::MAX_PRIORITY;

/// Default sorted-set key.
const DEFAULT_KEY: &str = "drover:dispatch";

/// 2^42 ms is roughly 139 years past the epoch; scores stay below 2^53 and
/// therefore exact in an `f64`.
const PRIORITY_STRIDE: i64 = 1 << 42;

#[derive(Debug, Clone)]
pub struct RedisDispatchChannel {
    client: Arc<redis::Client>,
    key: String,
}

impl RedisDispatchChannel {
    /// Creates a channel.
    ///
    /// * `redis_url` - e.g. `redis://localhost:6379`
    /// * `key` - sorted-set key, defaults to `drover:dispatch`
    pub fn new(redis_url: impl AsRef<str>, key: Option<String>) -> Result<Self, DispatchError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key: key.unwrap_or_else(|| DEFAULT_KEY.to_string()),
        })
    }

    pub(crate) fn score(hint: &DispatchHint) -> f64 {
        let priority = hint.priority.clamp(0, MAX_PRIORITY) as i64;
        let millis = hint.scheduled_at.timestamp_millis().clamp(0, PRIORITY_STRIDE - 1);
        ((MAX_PRIORITY as i64 - priority) * PRIORITY_STRIDE + millis) as f64
    }

    fn publish_sync(&self, hint: &DispatchHint) -> Result<(), DispatchError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        let _: i64 = redis::cmd("ZADD")
            .arg(&self.key)
            .arg("NX")
            .arg(Self::score(hint))
            .arg(hint.id.to_string())
            .query(&mut conn)
            .map_err(|e| DispatchError::Command(e.to_string()))?;

        Ok(())
    }

    fn pop_sync(&self) -> Result<Option<Uuid>, DispatchError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(&self.key)
            .arg(1)
            .query(&mut conn)
            .map_err(|e| DispatchError::Command(e.to_string()))?;

        match popped.into_iter().next() {
            Some((member, _score)) => match Uuid::parse_str(&member) {
                Ok(id) => Ok(Some(id)),
                Err(e) => {
                    warn!(member = %member, "Discarding malformed dispatch entry: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DispatchChannel for RedisDispatchChannel {
    async fn publish(&self, hint: DispatchHint) -> Result<(), DispatchError> {
        let channel = self.clone();
        tokio::task::spawn_blocking(move || channel.publish_sync(&hint))
            .await
            .map_err(|e| DispatchError::Command(e.to_string()))?
    }

    async fn pop(&self) -> Result<Option<Uuid>, DispatchError> {
        let channel = self.clone();
        tokio::task::spawn_blocking(move || channel.pop_sync())
            .await
            .map_err(|e| DispatchError::Command(e.to_string()))?
    }
}
