//! Database models for report jobs and stored reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Report Jobs
// ============================================================================

/// Cap on competitor URLs per job
pub const MAX_COMPETITOR_URLS: usize = 5;

/// ReportJob - matches the report_jobs table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: Uuid,
    pub user_id: String,
    pub homepage_url: String,
    pub pricing_url: Option<String>,
    pub competitor_urls: serde_json::Value,
    pub traffic_baseline: i64,
    pub average_deal_size: i64,
    pub status: String,
    pub execution_stage: String,
    pub execution_progress: i16,
    pub attempt_count: i32,
    pub idempotency_key: Option<String>,
    pub stage_context: Option<serde_json::Value>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReportJob {
    /// Competitor URLs from the JSONB column
    pub fn competitor_urls(&self) -> Vec<String> {
        serde_json::from_value(self.competitor_urls.clone()).unwrap_or_default()
    }

    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }

    pub fn stage(&self) -> Option<ExecutionStage> {
        ExecutionStage::parse(&self.execution_stage)
    }

    /// Whether a queued job has sat unclaimed past the staleness threshold
    pub fn is_stale_queued(&self, threshold: chrono::Duration) -> bool {
        self.status == JobStatus::Queued.as_str() && Utc::now() - self.created_at > threshold
    }
}

/// NewReportJob - submission payload for enqueue
#[derive(Debug, Clone)]
pub struct NewReportJob {
    pub user_id: String,
    pub homepage_url: String,
    pub pricing_url: Option<String>,
    pub competitor_urls: Vec<String>,
    pub traffic_baseline: i64,
    pub average_deal_size: i64,
    pub idempotency_key: Option<String>,
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "retrying" => Some(JobStatus::Retrying),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Pipeline execution stage.
///
/// The order here is the order the worker advances through; transitions
/// are monotonic except that a retry repeats the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Queued,
    ScrapingHomepage,
    ScrapingPricing,
    ScrapingCompetitors,
    GapAnalysis,
    CompetitorSynthesis,
    Scoring,
    RewriteGeneration,
    Finalizing,
    Complete,
    Failed,
}

/// The work stages a job advances through, in order
pub const WORK_STAGES: [ExecutionStage; 8] = [
    ExecutionStage::ScrapingHomepage,
    ExecutionStage::ScrapingPricing,
    ExecutionStage::ScrapingCompetitors,
    ExecutionStage::GapAnalysis,
    ExecutionStage::CompetitorSynthesis,
    ExecutionStage::Scoring,
    ExecutionStage::RewriteGeneration,
    ExecutionStage::Finalizing,
];

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Queued => "queued",
            ExecutionStage::ScrapingHomepage => "scraping_homepage",
            ExecutionStage::ScrapingPricing => "scraping_pricing",
            ExecutionStage::ScrapingCompetitors => "scraping_competitors",
            ExecutionStage::GapAnalysis => "gap_analysis",
            ExecutionStage::CompetitorSynthesis => "competitor_synthesis",
            ExecutionStage::Scoring => "scoring",
            ExecutionStage::RewriteGeneration => "rewrite_generation",
            ExecutionStage::Finalizing => "finalizing",
            ExecutionStage::Complete => "complete",
            ExecutionStage::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ExecutionStage::Queued),
            "scraping_homepage" => Some(ExecutionStage::ScrapingHomepage),
            "scraping_pricing" => Some(ExecutionStage::ScrapingPricing),
            "scraping_competitors" => Some(ExecutionStage::ScrapingCompetitors),
            "gap_analysis" => Some(ExecutionStage::GapAnalysis),
            "competitor_synthesis" => Some(ExecutionStage::CompetitorSynthesis),
            "scoring" => Some(ExecutionStage::Scoring),
            "rewrite_generation" => Some(ExecutionStage::RewriteGeneration),
            "finalizing" => Some(ExecutionStage::Finalizing),
            "complete" => Some(ExecutionStage::Complete),
            "failed" => Some(ExecutionStage::Failed),
            _ => None,
        }
    }

    /// Index within the ordered work stages; None for queued/terminal
    pub fn work_index(&self) -> Option<usize> {
        WORK_STAGES.iter().position(|s| s == self)
    }

    /// Progress percentage once this stage has completed
    pub fn progress_after(&self) -> i16 {
        match self.work_index() {
            Some(idx) => (((idx + 1) * 100) / WORK_STAGES.len()) as i16,
            None => match self {
                ExecutionStage::Complete => 100,
                _ => 0,
            },
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// StoredReport - matches the reports table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: Uuid,
    pub job_id: Uuid,
    pub user_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_round_trips_through_strings() {
        for stage in WORK_STAGES {
            assert_eq!(ExecutionStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(ExecutionStage::parse("complete"), Some(ExecutionStage::Complete));
        assert_eq!(ExecutionStage::parse("nonsense"), None);
    }

    #[test]
    fn progress_is_monotonic_along_the_stage_order() {
        let mut previous = 0i16;
        for stage in WORK_STAGES {
            let progress = stage.progress_after();
            assert!(progress > previous);
            previous = progress;
        }
        assert_eq!(ExecutionStage::Finalizing.progress_after(), 100);
        assert_eq!(ExecutionStage::Complete.progress_after(), 100);
        assert_eq!(ExecutionStage::Queued.progress_after(), 0);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Retrying,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn competitor_urls_parse_from_json() {
        let job = ReportJob {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            homepage_url: "https://acme.example".to_string(),
            pricing_url: None,
            competitor_urls: serde_json::json!(["https://rival.example"]),
            traffic_baseline: 500,
            average_deal_size: 8000,
            status: "queued".to_string(),
            execution_stage: "queued".to_string(),
            execution_progress: 0,
            attempt_count: 0,
            idempotency_key: None,
            stage_context: None,
            lease_expires_at: None,
            next_attempt_at: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            updated_at: Utc::now(),
            completed_at: None,
        };

        assert_eq!(job.competitor_urls(), vec!["https://rival.example"]);
        assert_eq!(job.status(), Some(JobStatus::Queued));
    }
}
