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
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::worker::{Worker, WorkerSettings};
use crate::queue::JobQueue;
use crate::registry::HandlerRegistry;

/// A running set of workers sharing one shutdown signal.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `num_workers` workers onto the current runtime.
    pub fn start(
        num_workers: usize,
        queue: JobQueue,
        registry: Arc<HandlerRegistry>,
        settings: WorkerSettings,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..num_workers)
            .map(|id| {
                let worker = Worker::new(id, queue.clone(), registry.clone(), settings.clone());
                tokio::spawn(worker.run(shutdown_rx.clone()))
            })
            .collect();

        info!(num_workers, "Worker pool started");
        Self {
            handles,
            shutdown_tx,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signals every worker to stop and waits up to `timeout` for them.
    ///
    /// In-flight jobs are allowed to finish within the bound. Returns
    /// `false` if any worker was still running when the bound elapsed.
    /// Those workers are left detached; a job they hold stays `processing`
    /// until it resolves or orphan recovery returns it to the queue.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        info!(workers = self.handles.len(), "Shutting down worker pool");
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(timeout, futures::future::join_all(self.handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Worker exited abnormally: {}", e);
                    }
                }
                info!("Worker pool stopped");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Worker pool did not stop within the shutdown timeout"
                );
                false
            }
        }
    }
}
