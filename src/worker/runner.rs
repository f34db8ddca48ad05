//! Job runner - main worker loop
//!
//! Claims jobs with the atomic claim query and drives them through the
//! processor. Stage errors never crash the loop: they are converted into
//! retry or terminal-failure transitions on the job row.

use crate::db::{report_jobs, DbPool};
use crate::error::{ReportError, Result};
use crate::worker::{JobProcessor, WorkerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Job runner that polls and processes report_jobs
pub struct JobRunner {
    pool: DbPool,
    config: WorkerConfig,
    processor: JobProcessor,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    /// Create a new job runner
    pub fn new(pool: DbPool, config: WorkerConfig, processor: JobProcessor) -> Self {
        Self {
            pool,
            config,
            processor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Main worker loop
    ///
    /// Claims and processes jobs until shutdown is signaled
    pub async fn run(&self) -> Result<()> {
        info!("Starting gap-report worker...");
        info!("Poll interval: {:?}", self.config.poll_interval);
        info!("Job timeout: {:?}", self.config.job_timeout);
        info!("Max stage attempts: {}", self.config.max_stage_attempts);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received, stopping worker...");
                break;
            }

            match self.process_one_job().await {
                Ok(true) => {
                    info!("Job finished, checking for next job...");
                }
                Ok(false) => {
                    sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    sleep(Duration::from_secs(10)).await;
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Claim and process a single job.
    ///
    /// Returns:
    /// - Ok(true) if a job was claimed and driven to a transition
    /// - Ok(false) if no jobs were claimable
    /// - Err on queue-level errors (claim/update failures)
    pub async fn process_one_job(&self) -> Result<bool> {
        let job = match report_jobs::claim_next_job(&self.pool, self.config.lease_secs).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        let job_id = job.id;
        info!(
            "Claimed job {}: {} (stage {}, attempt {})",
            job_id, job.homepage_url, job.execution_stage, job.attempt_count
        );

        let result = tokio::time::timeout(
            self.config.job_timeout,
            self.processor.process(&self.pool, &job),
        )
        .await;

        match result {
            Ok(Ok(report_id)) => {
                info!("Job {} completed, report {}", job_id, report_id);
                report_jobs::complete_job(&self.pool, job_id).await?;
            }
            Ok(Err(e)) => {
                self.handle_stage_failure(&job, &e).await?;
            }
            Err(_) => {
                warn!(
                    "Job {} timed out after {:?}",
                    job_id, self.config.job_timeout
                );
                let timeout_err = ReportError::JobTimeout;
                // A timeout is transient: the checkpointed stages are kept
                // and the retry resumes where the attempt stalled
                self.transition_failure(&job, &timeout_err, true).await?;
            }
        }

        Ok(true)
    }

    /// Run once and exit (for testing and opportunistic dispatch)
    pub async fn run_once(&self) -> Result<bool> {
        self.process_one_job().await
    }

    /// Process up to `max_jobs` due jobs; used by the cron sweep endpoint
    pub async fn sweep(&self, max_jobs: usize) -> Result<usize> {
        let mut processed = 0;
        for _ in 0..max_jobs {
            if !self.process_one_job().await? {
                break;
            }
            processed += 1;
        }
        Ok(processed)
    }

    async fn handle_stage_failure(&self, job: &crate::db::models::ReportJob, e: &ReportError) -> Result<()> {
        error!("Job {} stage failed: {}", job.id, e);
        self.transition_failure(job, e, e.is_transient()).await
    }

    async fn transition_failure(
        &self,
        job: &crate::db::models::ReportJob,
        e: &ReportError,
        transient: bool,
    ) -> Result<()> {
        let attempts_used = job.attempt_count + 1;

        if transient && attempts_used < self.config.max_stage_attempts {
            let backoff = report_jobs::retry_backoff_secs(job.attempt_count);
            warn!(
                "Job {} retrying at stage {} in {}s (attempt {}/{})",
                job.id, job.execution_stage, backoff, attempts_used, self.config.max_stage_attempts
            );
            report_jobs::mark_retrying(&self.pool, job.id, &e.to_string(), backoff).await?;
        } else {
            warn!("Job {} failed terminally: {}", job.id, e);
            report_jobs::mark_failed(&self.pool, job.id, &e.to_string()).await?;
        }

        Ok(())
    }
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    // Queue transitions need a database; see the #[ignore]d tests in
    // db/report_jobs.rs, tests/job_queue.rs, and tests/api_access.rs
}
