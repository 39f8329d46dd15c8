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

//! # Handler Registry
//!
//! Maps a job type to the handler that executes it. Registration normally
//! happens at startup, but lookups stay safe while registrations continue:
//! the map sits behind a read/write lock and handlers are shared as `Arc`s,
//! so a worker keeps the handler it looked up even if it is replaced.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::executor::JobContext;
use crate::models::job::Job;
use crate::retry::HandlerError;

/// Executes jobs of one type.
///
/// Delivery is at-least-once: a job may run again if a worker dies before
/// resolving it, so handlers must be idempotent.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: JobContext, job: Job) -> Result<(), HandlerError>;
}

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext, Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: JobContext, job: Job) -> Result<(), HandlerError> {
        (self.func)(ctx, job).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `job_type`, replacing any previous handler.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        let replaced = self
            .handlers
            .write()
            .insert(job_type.clone(), handler)
            .is_some();
        if replaced {
            tracing::debug!("Replaced handler for job type: {}", job_type);
        } else {
            tracing::debug!("Registered handler for job type: {}", job_type);
        }
    }

    /// Registers an async closure as the handler for `job_type`.
    ///
    /// ```rust,ignore
    /// registry.register_fn("send_email", |_ctx, job| async move {
    ///     let email: Email = job.payload_as()?;
    ///     mailer.send(email).await?;
    ///     Ok(())
    /// });
    /// ```
    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, func: F)
    where
        F: Fn(JobContext, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(job_type, Arc::new(FnHandler::new(func)));
    }

    pub fn lookup(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }
}
