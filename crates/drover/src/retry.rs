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

//! Retry policy and handler error classification.
//!
//! [`RetryPolicy::decide`] is a pure function of the attempt count, the
//! ceiling and the error. Transient errors are retried with a backoff until
//! the ceiling is reached; permanent errors fail immediately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// An error returned by a job handler.
///
/// Handler errors never propagate into the worker loop; their text is
/// recorded as the job's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
    retryable: bool,
}

impl HandlerError {
    /// A failure that may succeed on a later attempt.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that retrying cannot fix, such as an invalid payload.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::transient(format!("{:#}", err))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::transient(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::transient(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::permanent(format!("invalid payload: {}", err))
    }
}

/// How the delay grows with the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * attempts`
    Linear,
    /// `base`, regardless of attempts
    Fixed,
    /// `base * multiplier^(attempts - 1)`
    Exponential { multiplier: f64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Linear
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    base_backoff: Duration,
    strategy: BackoffStrategy,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(60),
            strategy: BackoffStrategy::Linear,
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_backoff: Duration, strategy: BackoffStrategy, max_delay: Duration) -> Self {
        Self {
            base_backoff,
            strategy,
            max_delay,
        }
    }

    /// Linear backoff with the given base and the default one hour cap.
    pub fn linear(base_backoff: Duration) -> Self {
        Self {
            base_backoff,
            ..Default::default()
        }
    }

    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Decides the fate of a job after a failed attempt.
    ///
    /// `attempts` already includes the attempt that just failed.
    pub fn decide(&self, attempts: i32, max_attempts: i32, error: &HandlerError) -> RetryDecision {
        if !error.is_retryable() || attempts >= max_attempts {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry(self.delay_for(attempts))
    }

    /// Backoff before the attempt following attempt number `attempts`.
    pub fn delay_for(&self, attempts: i32) -> Duration {
        let attempts = attempts.max(1) as u32;
        let delay = match self.strategy {
            BackoffStrategy::Linear => self.base_backoff.saturating_mul(attempts),
            BackoffStrategy::Fixed => self.base_backoff,
            BackoffStrategy::Exponential { multiplier } => {
                let factor = multiplier.max(1.0).powi(attempts as i32 - 1);
                let secs = self.base_backoff.as_secs_f64() * factor;
                if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    self.max_delay
                }
            }
        };
        delay.min(self.max_delay)
    }
}
