//! Worker configuration

use crate::llm::DEFAULT_CHAT_MODEL;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll interval when no jobs are claimable
    pub poll_interval: Duration,

    /// Hard timeout for one job attempt
    pub job_timeout: Duration,

    /// Worker lease on a claimed job; an expired lease makes the job
    /// reclaimable by the next sweep
    pub lease_secs: u64,

    /// Attempts before a transient stage failure becomes terminal
    pub max_stage_attempts: i32,

    /// Jobs processed per cron sweep
    pub sweep_batch_size: usize,

    /// A queued job older than this triggers opportunistic dispatch from
    /// the status probe
    pub stale_queued_secs: i64,

    /// Chat model used by all generation modules
    pub chat_model: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            job_timeout: Duration::from_secs(300), // 5 minutes
            lease_secs: 120,
            max_stage_attempts: 4,
            sweep_batch_size: 5,
            stale_queued_secs: 120,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }
}

/// Builder for WorkerConfig
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set poll interval
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self
    }

    /// Set job timeout
    pub fn job_timeout(mut self, duration: Duration) -> Self {
        self.config.job_timeout = duration;
        self
    }

    /// Set the worker lease duration in seconds
    pub fn lease_secs(mut self, secs: u64) -> Self {
        self.config.lease_secs = secs;
        self
    }

    /// Set max attempts before terminal failure
    pub fn max_stage_attempts(mut self, attempts: i32) -> Self {
        self.config.max_stage_attempts = attempts;
        self
    }

    /// Set the chat model
    pub fn chat_model(mut self, model: &str) -> Self {
        self.config.chat_model = model.to_string();
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

impl Default for WorkerConfigBuilder {
    fn default() -> Self {
        Self {
            config: WorkerConfig::default(),
        }
    }
}
