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

//! # Cron Scheduling
//!
//! Recurring producers. A [`CronEntry`] pairs a six-field cron expression
//! (`sec min hour day-of-month month day-of-week`, UTC) with a job type and
//! a fixed payload. The [`CronScheduler`] enqueues one job through the
//! normal [`JobQueue::enqueue`](crate::queue::JobQueue::enqueue) path on
//! every trigger; cron jobs are executed by the same workers as any other
//! job.
//!
//! Entries are fixed once the scheduler starts.

mod schedule;
mod scheduler;

pub use schedule::{CronSchedule, CRON_FIELDS};
pub use scheduler::{CronEntry, CronScheduler};

use crate::error::CronError;
use crate::models::job_types;

/// Standard maintenance schedules as `(expression, job_type)`.
pub const DEFAULT_CRON_JOBS: &[(&str, &str)] = &[
    // hourly
    ("0 0 * * * *", job_types::CLEANUP_SESSIONS),
    ("0 0 */6 * * *", job_types::UPDATE_RECOMMENDATIONS),
    // daily at 02:00
    ("0 0 2 * * *", job_types::CALCULATE_ANALYTICS),
    // Sundays at 03:00
    ("0 0 3 * * 0", job_types::CLEANUP_EXPIRED),
    // first of the month at 04:00
    ("0 0 4 1 * *", job_types::ARCHIVE_OLD_DATA),
    ("0 0 1 * * *", job_types::RECONCILE_PAYMENTS),
    // Mondays at 05:00
    ("0 0 5 * * 1", job_types::UPDATE_VENDOR_RANKS),
    ("0 0 */4 * * *", job_types::DETECT_LIFE_EVENTS),
    ("0 */30 * * * *", job_types::PROCESS_REFERRALS),
];

/// Entries for [`DEFAULT_CRON_JOBS`], each with an empty object payload.
pub fn default_cron_entries() -> Result<Vec<CronEntry>, CronError> {
    DEFAULT_CRON_JOBS
        .iter()
        .map(|(expression, job_type)| {
            CronEntry::new(expression, *job_type, serde_json::json!({}))
        })
        .collect()
}
