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

//! # Drover
//!
//! A durable, priority-ordered, retrying background job queue backed by
//! PostgreSQL or SQLite.
//!
//! Producers call [`JobQueue::enqueue`] to persist a job. A pool of workers
//! claims jobs one at a time, runs the handler registered for the job's
//! type under a timeout, and records the outcome. Failed attempts are
//! retried with backoff until the job's attempt ceiling is reached, after
//! which the job stays `failed` for operator triage.
//!
//! ## Components
//!
//! - [`queue`]: the Queue Store, the only writer of job rows
//! - [`registry`]: job type to handler mapping
//! - [`retry`]: backoff policy and handler error classification
//! - [`executor`]: workers and the worker pool
//! - [`mover`]: periodic promotion of due retries and dispatch-hint refresh
//! - [`cron`]: recurring producers
//! - [`monitoring`]: statistics, failed-job listing and manual retry
//! - [`dispatcher`]: optional fast dispatch channel (in-memory or Redis)
//! - [`service`]: wires all of the above into one start/stop lifecycle
//!
//! ## Job lifecycle
//!
//! ```text
//! pending ──claim──▶ processing ──success──▶ completed
//!    ▲                   │
//!    │                   ├──error, attempts < max──▶ retrying ──backoff elapsed──┐
//!    │                   │                                                       │
//!    │                   └──error, attempts = max──▶ failed                      │
//!    │                                                 │                         │
//!    └──────────────────────retry_failed───────────────┘◀────────────────────────┘
//! ```
//!
//! A `retrying` job is claimable again as soon as its backoff has elapsed;
//! the mover additionally folds such jobs back into `pending`.
//!
//! Delivery is at-least-once. A worker that dies mid-execution leaves its
//! job `processing` until orphan recovery returns it to `pending`, so
//! handlers must be idempotent.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use drover::{JobService, JobServiceConfig, NewJob};
//!
//! let service = JobService::connect("sqlite://jobs.db", JobServiceConfig::default()).await?;
//! service.register_fn("send_email", |_ctx, job| async move {
//!     println!("sending {}", job.payload);
//!     Ok(())
//! });
//! service.start().await?;
//!
//! service
//!     .queue()
//!     .enqueue(NewJob::new("send_email", serde_json::json!({"to": "a@b.c"})).priority(80))
//!     .await?;
//!
//! service.stop().await?;
//! ```

pub mod config;
pub mod cron;
pub mod dal;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod models;
pub mod monitoring;
pub mod mover;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod service;

pub use config::{JobServiceConfig, JobServiceConfigBuilder};
pub use cron::{CronEntry, CronSchedule, CronScheduler};
pub use database::{BackendType, Database};
pub use dispatcher::{DispatchChannel, DispatchHint, MemoryDispatchChannel};
#[cfg(feature = "redis")]
pub use dispatcher::RedisDispatchChannel;
pub use error::{ConfigError, CronError, DispatchError, QueueError, ServiceError};
pub use executor::{JobContext, Worker, WorkerPool, WorkerSettings};
pub use models::job::{Job, JobOutcome, JobStats, JobStatus, NewJob};
pub use models::job_types;
pub use monitoring::{JobMonitor, JobStatsReport};
pub use mover::ReadyQueueMover;
pub use queue::JobQueue;
pub use registry::{FnHandler, HandlerRegistry, JobHandler};
pub use retry::{BackoffStrategy, HandlerError, RetryDecision, RetryPolicy};
pub use service::JobService;

/// Installs a global `tracing` subscriber writing formatted events to stdout.
///
/// `RUST_LOG` takes precedence; otherwise `level` is used, falling back to
/// `info`. Calling this more than once, or after another subscriber has
/// been installed, is a no-op.
pub fn init_logging(level: Option<&str>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
