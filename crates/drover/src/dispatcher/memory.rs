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

//! In-process dispatch channel backed by a binary heap.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use super::{DispatchChannel, DispatchHint};
use crate::error::DispatchError;

#[derive(Default)]
struct HeapState {
    heap: BinaryHeap<DispatchHint>,
    queued: HashSet<Uuid>,
}

/// Dispatch channel for workers that share one process.
///
/// Idle workers parked in [`DispatchChannel::wait_for_work`] are woken as
/// soon as a hint is published.
#[derive(Default)]
pub struct MemoryDispatchChannel {
    state: Mutex<HeapState>,
    notify: Notify,
}

impl MemoryDispatchChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DispatchChannel for MemoryDispatchChannel {
    async fn publish(&self, hint: DispatchHint) -> Result<(), DispatchError> {
        {
            let mut state = self.state.lock();
            if !state.queued.insert(hint.id) {
                return Ok(());
            }
            state.heap.push(hint);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<Option<Uuid>, DispatchError> {
        let mut state = self.state.lock();
        let hint = state.heap.pop();
        if let Some(ref hint) = hint {
            state.queued.remove(&hint.id);
        }
        Ok(hint.map(|h| h.id))
    }

    async fn wait_for_work(&self, max_wait: Duration) {
        if !self.is_empty() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(max_wait) => {
                debug!("Dispatch poll interval elapsed");
            }
            _ = self.notify.notified() => {
                debug!("Dispatch hint published");
            }
        }
    }
}
