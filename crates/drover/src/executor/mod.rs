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

//! # Worker Pool
//!
//! A fixed number of [`Worker`]s each run an independent loop:
//!
//! 1. Check for a shutdown signal.
//! 2. Claim one job from the [`JobQueue`](crate::queue::JobQueue).
//! 3. Look up the handler for its type and run it in its own task under the
//!    configured timeout.
//! 4. Resolve the job as completed, retrying or failed.
//!
//! When nothing is claimable the worker waits for a dispatch hint or the
//! poll interval, whichever comes first. A worker holds at most one job at
//! a time and only checks for shutdown between jobs, so in-flight jobs are
//! allowed to finish. [`WorkerPool::shutdown`] bounds that wait.

mod context;
mod pool;
mod worker;

pub use context::JobContext;
pub use pool::WorkerPool;
pub use worker::{Worker, WorkerSettings};
