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

//! Configuration for the [`JobService`](crate::JobService).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::executor::WorkerSettings;
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Configuration for the job service
///
/// Controls worker concurrency, retry behaviour, timeouts, the ready-queue
/// mover and cron scheduling.
///
/// # Construction
///
/// ```rust,ignore
/// let config = JobServiceConfig::builder()
///     .num_workers(8)
///     .job_timeout(Duration::from_secs(120))
///     .build()?;
/// ```
///
/// Or from a TOML document:
///
/// ```toml
/// [worker]
/// num_workers = 8
/// job_timeout_secs = 120
/// poll_interval_ms = 500
///
/// [retry]
/// max_retries = 5
/// backoff_secs = 30
/// strategy = { type = "exponential", multiplier = 2.0 }
///
/// [mover]
/// interval_secs = 5
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct JobServiceConfig {
    num_workers: usize,
    max_retries: i32,
    retry_backoff: Duration,
    backoff_strategy: BackoffStrategy,
    max_backoff: Duration,
    poll_interval: Duration,
    job_timeout: Duration,
    shutdown_timeout: Duration,
    mover_interval: Duration,
    mover_batch_size: usize,
    enable_orphan_recovery: bool,
    orphan_grace: Duration,
    enable_cron: bool,
    db_pool_size: u32,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        JobServiceConfigBuilder::default().config
    }
}

impl JobServiceConfig {
    pub fn builder() -> JobServiceConfigBuilder {
        JobServiceConfigBuilder::default()
    }

    /// Number of concurrent workers.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Default attempt ceiling for jobs that do not set their own.
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Base delay for the backoff strategy.
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn backoff_strategy(&self) -> BackoffStrategy {
        self.backoff_strategy
    }

    /// Upper bound on any single backoff delay.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// How long an idle worker waits before polling the store again.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Maximum time allowed for a single handler invocation.
    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// How long `stop` waits for in-flight jobs to finish.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn mover_interval(&self) -> Duration {
        self.mover_interval
    }

    pub fn mover_batch_size(&self) -> usize {
        self.mover_batch_size
    }

    pub fn enable_orphan_recovery(&self) -> bool {
        self.enable_orphan_recovery
    }

    /// Extra time beyond `job_timeout` before a claim counts as orphaned.
    pub fn orphan_grace(&self) -> Duration {
        self.orphan_grace
    }

    pub fn enable_cron(&self) -> bool {
        self.enable_cron
    }

    /// Number of database connections in the pool.
    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_backoff, self.backoff_strategy, self.max_backoff)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: self.poll_interval,
            job_timeout: self.job_timeout,
            retry_policy: self.retry_policy(),
        }
    }

    /// Age after which a `processing` claim is returned to the queue.
    pub fn orphan_threshold(&self) -> Duration {
        self.job_timeout.saturating_add(self.orphan_grace)
    }

    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(input)?;
        file.apply(Self::builder()).build()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid("num_workers must be at least 1".into()));
        }
        if self.max_retries < 1 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("job_timeout", self.job_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
            ("mover_interval", self.mover_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }
        if self.mover_batch_size == 0 {
            return Err(ConfigError::Invalid("mover_batch_size must be at least 1".into()));
        }
        if self.db_pool_size == 0 {
            return Err(ConfigError::Invalid("db_pool_size must be at least 1".into()));
        }
        if let BackoffStrategy::Exponential { multiplier } = self.backoff_strategy {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "exponential backoff multiplier must be >= 1.0, got {}",
                    multiplier
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`JobServiceConfig`].
#[derive(Debug, Clone)]
pub struct JobServiceConfigBuilder {
    config: JobServiceConfig,
}

impl Default for JobServiceConfigBuilder {
    fn default() -> Self {
        Self {
            config: JobServiceConfig {
                num_workers: 5,
                max_retries: 3,
                retry_backoff: Duration::from_secs(60),
                backoff_strategy: BackoffStrategy::Linear,
                max_backoff: Duration::from_secs(3600),
                poll_interval: Duration::from_secs(1),
                job_timeout: Duration::from_secs(300),
                shutdown_timeout: Duration::from_secs(30),
                mover_interval: Duration::from_secs(10),
                mover_batch_size: 100,
                enable_orphan_recovery: true,
                orphan_grace: Duration::from_secs(60),
                enable_cron: true,
                db_pool_size: 10,
            },
        }
    }
}

impl JobServiceConfigBuilder {
    pub fn num_workers(mut self, value: usize) -> Self {
        self.config.num_workers = value;
        self
    }

    pub fn max_retries(mut self, value: i32) -> Self {
        self.config.max_retries = value;
        self
    }

    pub fn retry_backoff(mut self, value: Duration) -> Self {
        self.config.retry_backoff = value;
        self
    }

    pub fn backoff_strategy(mut self, value: BackoffStrategy) -> Self {
        self.config.backoff_strategy = value;
        self
    }

    pub fn max_backoff(mut self, value: Duration) -> Self {
        self.config.max_backoff = value;
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    pub fn job_timeout(mut self, value: Duration) -> Self {
        self.config.job_timeout = value;
        self
    }

    pub fn shutdown_timeout(mut self, value: Duration) -> Self {
        self.config.shutdown_timeout = value;
        self
    }

    pub fn mover_interval(mut self, value: Duration) -> Self {
        self.config.mover_interval = value;
        self
    }

    pub fn mover_batch_size(mut self, value: usize) -> Self {
        self.config.mover_batch_size = value;
        self
    }

    pub fn enable_orphan_recovery(mut self, value: bool) -> Self {
        self.config.enable_orphan_recovery = value;
        self
    }

    pub fn orphan_grace(mut self, value: Duration) -> Self {
        self.config.orphan_grace = value;
        self
    }

    pub fn enable_cron(mut self, value: bool) -> Self {
        self.config.enable_cron = value;
        self
    }

    pub fn db_pool_size(mut self, value: u32) -> Self {
        self.config.db_pool_size = value;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<JobServiceConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    worker: WorkerSection,
    #[serde(default)]
    retry: RetrySection,
    #[serde(default)]
    mover: MoverSection,
    #[serde(default)]
    cron: CronSection,
    #[serde(default)]
    database: DatabaseSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkerSection {
    num_workers: Option<usize>,
    poll_interval_ms: Option<u64>,
    job_timeout_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrySection {
    max_retries: Option<i32>,
    backoff_secs: Option<u64>,
    max_backoff_secs: Option<u64>,
    strategy: Option<BackoffStrategy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoverSection {
    interval_secs: Option<u64>,
    batch_size: Option<usize>,
    enable_orphan_recovery: Option<bool>,
    orphan_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CronSection {
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseSection {
    pool_size: Option<u32>,
}

impl ConfigFile {
    fn apply(self, mut builder: JobServiceConfigBuilder) -> JobServiceConfigBuilder {
        let c = &mut builder.config;

        if let Some(v) = self.worker.num_workers {
            c.num_workers = v;
        }
        if let Some(v) = self.worker.poll_interval_ms {
            c.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.worker.job_timeout_secs {
            c.job_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.worker.shutdown_timeout_secs {
            c.shutdown_timeout = Duration::from_secs(v);
        }

        if let Some(v) = self.retry.max_retries {
            c.max_retries = v;
        }
        if let Some(v) = self.retry.backoff_secs {
            c.retry_backoff = Duration::from_secs(v);
        }
        if let Some(v) = self.retry.max_backoff_secs {
            c.max_backoff = Duration::from_secs(v);
        }
        if let Some(v) = self.retry.strategy {
            c.backoff_strategy = v;
        }

        if let Some(v) = self.mover.interval_secs {
            c.mover_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.mover.batch_size {
            c.mover_batch_size = v;
        }
        if let Some(v) = self.mover.enable_orphan_recovery {
            c.enable_orphan_recovery = v;
        }
        if let Some(v) = self.mover.orphan_grace_secs {
            c.orphan_grace = Duration::from_secs(v);
        }

        if let Some(v) = self.cron.enabled {
            c.enable_cron = v;
        }
        if let Some(v) = self.database.pool_size {
            c.db_pool_size = v;
        }

        builder
    }
}
