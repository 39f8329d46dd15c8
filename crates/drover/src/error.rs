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

//! Error types for the job queue.
//!
//! Errors are grouped by the layer that produces them:
//!
//! - [`QueueError`]: storage-layer failures and invalid producer input
//! - [`DispatchError`]: failures talking to the fast dispatch channel
//! - [`CronError`]: invalid recurring schedule definitions
//! - [`ConfigError`]: configuration loading and validation
//! - [`ServiceError`]: lifecycle misuse of the [`crate::JobService`]
//!
//! Handler failures are not errors of the queue itself; they are modelled by
//! [`crate::retry::HandlerError`] and recorded on the job row.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::models::job::JobStatus;

/// Errors raised by the Queue Store and its data access layer.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A connection could not be checked out of the pool, or the blocking
    /// interaction with it failed.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// The database rejected a statement.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// No job exists with the given id.
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// The job exists but is not in a state that allows the requested transition.
    #[error("Job {id} is in state '{status}', which does not allow this operation")]
    InvalidState { id: Uuid, status: JobStatus },

    /// Priority outside of the accepted `0..=100` range.
    #[error("Invalid priority: {0} (must be between 0 and 100)")]
    InvalidPriority(i32),

    /// Job type empty or longer than [`crate::models::job::MAX_JOB_TYPE_LEN`] bytes.
    #[error("Invalid job type '{0}' (must be 1 to 100 bytes)")]
    InvalidJobType(String),

    /// A job must be allowed at least one attempt.
    #[error("Invalid max_attempts: {0} (must be at least 1)")]
    InvalidMaxAttempts(i32),

    /// The payload could not be serialized or deserialized.
    #[error("Payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),

    /// A stored row could not be converted into a domain [`crate::Job`].
    #[error("Corrupt job row: {0}")]
    CorruptRow(String),

    /// Embedded migrations failed to apply.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Errors raised by a [`crate::dispatcher::DispatchChannel`].
///
/// The queue never propagates these to producers; the reliable claim path
/// makes the channel strictly optional.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatch channel connection error: {0}")]
    Connection(String),

    #[error("Dispatch channel command error: {0}")]
    Command(String),
}

/// Errors raised while parsing or registering a recurring schedule.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Cron expression '{expression}' has {found} fields; expected 6 (seconds first)")]
    FieldCount { expression: String, found: usize },

    #[error("Cron expression '{0}' has no upcoming occurrence")]
    NoUpcomingOccurrence(String),
}

/// Errors raised while loading a [`crate::config::JobServiceConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the [`crate::JobService`] lifecycle.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Job service is already running")]
    AlreadyRunning,

    #[error("Job service is not running")]
    NotRunning,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Cron(#[from] CronError),
}
