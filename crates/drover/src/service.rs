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

//! # Job Service
//!
//! Process-level wiring. A [`JobService`] owns the queue, the handler
//! registry and the cron table, and starts or stops the background
//! services together:
//!
//! - the [`WorkerPool`]
//! - the [`ReadyQueueMover`]
//! - the [`CronScheduler`], when enabled and at least one entry exists
//!
//! ```rust,ignore
//! let database = Database::new("sqlite://jobs.db", "", 1)?;
//! database.run_migrations().await?;
//!
//! let service = JobService::new(database, JobServiceConfig::default());
//! service.register_fn(job_types::SEND_EMAIL, |_ctx, job| async move {
//!     let email: Email = job.payload_as()?;
//!     mailer.send(email).await?;
//!     Ok(())
//! });
//! service.register_default_cron_jobs()?;
//! service.start().await?;
//!
//! service.queue().enqueue(NewJob::new(job_types::SEND_EMAIL, payload)).await?;
//!
//! service.stop().await?;
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::JobServiceConfig;
use crate::cron::{default_cron_entries, CronEntry, CronScheduler};
use crate::database::Database;
use crate::dispatcher::DispatchChannel;
use crate::error::{QueueError, ServiceError};
use crate::executor::{JobContext, WorkerPool};
use crate::models::job::Job;
use crate::monitoring::JobMonitor;
use crate::mover::ReadyQueueMover;
use crate::queue::JobQueue;
use crate::registry::{HandlerRegistry, JobHandler};
use crate::retry::HandlerError;

/// Handles to the background services of a running [`JobService`].
struct RuntimeHandles {
    pool: WorkerPool,
    mover_handle: JoinHandle<()>,
    cron_handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct JobService {
    queue: JobQueue,
    registry: Arc<HandlerRegistry>,
    config: JobServiceConfig,
    cron_entries: Mutex<Vec<CronEntry>>,
    runtime: tokio::sync::Mutex<Option<RuntimeHandles>>,
}

impl std::fmt::Debug for JobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService")
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("cron_entries", &self.cron_entries.lock().len())
            .finish()
    }
}

impl JobService {
    /// Creates a stopped service over an already migrated database.
    pub fn new(database: Database, config: JobServiceConfig) -> Self {
        let queue = JobQueue::new(database).with_default_max_attempts(config.max_retries());
        Self {
            queue,
            registry: Arc::new(HandlerRegistry::new()),
            config,
            cron_entries: Mutex::new(Vec::new()),
            runtime: tokio::sync::Mutex::new(None),
        }
    }

    /// Connects to `database_url`, applies migrations and creates a stopped
    /// service.
    pub async fn connect(
        database_url: &str,
        config: JobServiceConfig,
    ) -> Result<Self, QueueError> {
        let database = Database::new(database_url, "", config.db_pool_size())?;
        database.run_migrations().await?;
        Ok(Self::new(database, config))
    }

    /// Adds a fast dispatch channel. Must be called before [`JobService::start`].
    pub fn with_dispatch_channel(mut self, channel: Arc<dyn DispatchChannel>) -> Self {
        self.queue = self.queue.with_dispatch_channel(channel);
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &JobServiceConfig {
        &self.config
    }

    pub fn monitor(&self) -> JobMonitor {
        JobMonitor::new(self.queue.clone())
    }

    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.registry.register(job_type, handler);
    }

    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, func: F)
    where
        F: Fn(JobContext, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.registry.register_fn(job_type, func);
    }

    /// Adds a recurring producer. Entries added after [`JobService::start`]
    /// take effect on the next start.
    pub fn schedule_cron(
        &self,
        expression: &str,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let entry = CronEntry::new(expression, job_type, payload)?;
        info!(
            job_type = %entry.job_type,
            schedule = %entry.schedule,
            "Scheduled cron job"
        );
        self.cron_entries.lock().push(entry);
        Ok(())
    }

    /// Registers the standard maintenance schedules.
    pub fn register_default_cron_jobs(&self) -> Result<(), ServiceError> {
        let entries = default_cron_entries()?;
        info!(count = entries.len(), "Registered default cron jobs");
        self.cron_entries.lock().extend(entries);
        Ok(())
    }

    pub fn cron_entries(&self) -> Vec<CronEntry> {
        self.cron_entries.lock().clone()
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.is_some()
    }

    /// Starts the worker pool, the mover and, when enabled, the cron scheduler.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        info!(
            num_workers = self.config.num_workers(),
            handlers = ?self.registry.job_types(),
            "Starting job service"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pool = WorkerPool::start(
            self.config.num_workers(),
            self.queue.clone(),
            self.registry.clone(),
            self.config.worker_settings(),
        );

        let mut mover = ReadyQueueMover::new(
            self.queue.clone(),
            self.config.mover_interval(),
            self.config.mover_batch_size(),
        );
        if self.config.enable_orphan_recovery() {
            mover = mover.with_orphan_recovery(self.config.orphan_threshold());
        }
        let mover_handle = tokio::spawn(mover.run(shutdown_rx.clone()));

        let entries = self.cron_entries();
        let cron_handle = if self.config.enable_cron() && !entries.is_empty() {
            let scheduler = CronScheduler::new(self.queue.clone(), entries);
            Some(tokio::spawn(scheduler.run(shutdown_rx)))
        } else {
            None
        };

        *runtime = Some(RuntimeHandles {
            pool,
            mover_handle,
            cron_handle,
            shutdown_tx,
        });

        info!("Job service started");
        Ok(())
    }

    /// Stops producing new claims and waits, up to the shutdown timeout, for
    /// in-flight jobs to finish.
    ///
    /// Returns `Ok(true)` when every worker exited within the timeout.
    pub async fn stop(&self) -> Result<bool, ServiceError> {
        let RuntimeHandles {
            pool,
            mover_handle,
            cron_handle,
            shutdown_tx,
        } = self
            .runtime
            .lock()
            .await
            .take()
            .ok_or(ServiceError::NotRunning)?;

        info!("Stopping job service");
        let _ = shutdown_tx.send(true);

        let background = async {
            if let Some(cron_handle) = cron_handle {
                if let Err(e) = cron_handle.await {
                    warn!("Cron scheduler exited abnormally: {}", e);
                }
            }
            if let Err(e) = mover_handle.await {
                warn!("Ready-queue mover exited abnormally: {}", e);
            }
        };
        let (clean, ()) = tokio::join!(
            pool.shutdown(self.config.shutdown_timeout()),
            background
        );

        if clean {
            info!("Job service stopped gracefully");
        } else {
            warn!("Job service shutdown timed out; some workers did not exit cleanly");
        }
        Ok(clean)
    }
}
