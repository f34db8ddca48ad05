//! Report job queue operations
//!
//! All coordination between API, cron sweeps, and concurrent workers is
//! expressed through these queries. Claiming is a single atomic UPDATE so
//! at most one worker ever holds a job, and a lease lets the next sweep
//! reclaim a job whose worker died mid-stage.

use crate::db::models::{ExecutionStage, NewReportJob, ReportJob};
use crate::db::DbPool;
use crate::error::Result;
use sqlx::Row;
use uuid::Uuid;

/// Dedup window for idempotent submission
pub const IDEMPOTENCY_WINDOW_HOURS: i64 = 24;

/// Enqueue a report job.
///
/// A duplicate submission with the same (user, idempotency key) within the
/// dedup window returns the existing job instead of creating a new one.
pub async fn enqueue_job(pool: &DbPool, new_job: &NewReportJob) -> Result<ReportJob> {
    if let Some(key) = &new_job.idempotency_key {
        if let Some(existing) = find_by_idempotency_key(pool, &new_job.user_id, key).await? {
            return Ok(existing);
        }
    }

    let inserted = sqlx::query_as::<_, ReportJob>(
        r#"
        INSERT INTO report_jobs (
            id, user_id, homepage_url, pricing_url, competitor_urls,
            traffic_baseline, average_deal_size, status, execution_stage,
            idempotency_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'queued', 'queued', $8)
        ON CONFLICT (user_id, idempotency_key) WHERE idempotency_key IS NOT NULL
        DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new_job.user_id)
    .bind(&new_job.homepage_url)
    .bind(&new_job.pricing_url)
    .bind(serde_json::json!(new_job.competitor_urls))
    .bind(new_job.traffic_baseline)
    .bind(new_job.average_deal_size)
    .bind(&new_job.idempotency_key)
    .fetch_optional(pool)
    .await?;

    if let Some(job) = inserted {
        return Ok(job);
    }

    // Insert hit the unique index: a concurrent submission won the race.
    let key = new_job
        .idempotency_key
        .as_deref()
        .unwrap_or_default()
        .to_string();
    let existing = find_by_idempotency_key(pool, &new_job.user_id, &key)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound)?;
    Ok(existing)
}

async fn find_by_idempotency_key(
    pool: &DbPool,
    user_id: &str,
    key: &str,
) -> Result<Option<ReportJob>> {
    let job = sqlx::query_as::<_, ReportJob>(
        r#"
        SELECT * FROM report_jobs
        WHERE user_id = $1
          AND idempotency_key = $2
          AND created_at > NOW() - make_interval(hours => $3)
        "#,
    )
    .bind(user_id)
    .bind(key)
    .bind(IDEMPOTENCY_WINDOW_HOURS as i32)
    .fetch_optional(pool)
    .await?;

    Ok(job)
}

/// Atomically claim the next due job and return it.
///
/// Claimable jobs are queued, retrying with their backoff elapsed, or
/// running with an expired lease (worker died mid-stage). Safe for
/// concurrent workers; a claim against a completed or failed job matches
/// zero rows.
pub async fn claim_next_job(pool: &DbPool, lease_secs: u64) -> Result<Option<ReportJob>> {
    let job = sqlx::query_as::<_, ReportJob>(
        r#"
        WITH next_job AS (
            SELECT id FROM report_jobs
            WHERE status = 'queued'
               OR (status = 'retrying'
                   AND (next_attempt_at IS NULL OR next_attempt_at <= NOW()))
               OR (status = 'running'
                   AND lease_expires_at IS NOT NULL
                   AND lease_expires_at < NOW())
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE report_jobs
        SET status = 'running',
            started_at = COALESCE(started_at, NOW()),
            lease_expires_at = NOW() + make_interval(secs => $1),
            next_attempt_at = NULL,
            updated_at = NOW()
        WHERE id = (SELECT id FROM next_job)
        RETURNING *
        "#,
    )
    .bind(lease_secs as f64)
    .fetch_optional(pool)
    .await?;

    Ok(job)
}

/// Checkpoint a completed stage: stage, progress, context, lease renewal.
///
/// Committed immediately after each stage so a reclaimed job resumes from
/// its last completed stage rather than restarting.
pub async fn checkpoint_stage(
    pool: &DbPool,
    job_id: Uuid,
    stage: ExecutionStage,
    progress: i16,
    stage_context: &serde_json::Value,
    lease_secs: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE report_jobs
        SET execution_stage = $2,
            execution_progress = $3,
            stage_context = $4,
            lease_expires_at = NOW() + make_interval(secs => $5),
            updated_at = NOW()
        WHERE id = $1
          AND status = 'running'
        "#,
    )
    .bind(job_id)
    .bind(stage.as_str())
    .bind(progress)
    .bind(stage_context)
    .bind(lease_secs as f64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a job to retrying at its current stage with exponential backoff
pub async fn mark_retrying(
    pool: &DbPool,
    job_id: Uuid,
    error_msg: &str,
    backoff_secs: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE report_jobs
        SET status = 'retrying',
            attempt_count = attempt_count + 1,
            error = $2,
            next_attempt_at = NOW() + make_interval(secs => $3),
            lease_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(error_msg)
    .bind(backoff_secs as f64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a job to terminal failure; never auto-retried afterwards
pub async fn mark_failed(pool: &DbPool, job_id: Uuid, error_msg: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE report_jobs
        SET status = 'failed',
            execution_stage = 'failed',
            error = $2,
            lease_expires_at = NULL,
            next_attempt_at = NULL,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(error_msg)
    .execute(pool)
    .await?;

    Ok(())
}

/// Complete a job after its report has been persisted
pub async fn complete_job(pool: &DbPool, job_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE report_jobs
        SET status = 'completed',
            execution_stage = 'complete',
            execution_progress = 100,
            error = NULL,
            lease_expires_at = NULL,
            next_attempt_at = NULL,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job_by_id(pool: &DbPool, job_id: Uuid) -> Result<Option<ReportJob>> {
    let job = sqlx::query_as::<_, ReportJob>("SELECT * FROM report_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(job)
}

/// Count jobs currently waiting for a worker, for monitoring
pub async fn count_claimable_jobs(pool: &DbPool) -> Result<i64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) as count FROM report_jobs
        WHERE status = 'queued'
           OR (status = 'retrying'
               AND (next_attempt_at IS NULL OR next_attempt_at <= NOW()))
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(row.get("count"))
}

/// Exponential backoff schedule between attempts, capped
pub fn retry_backoff_secs(attempt_count: i32) -> u64 {
    let attempt = attempt_count.clamp(0, 10) as u32;
    std::cmp::min(30 * 2u64.saturating_pow(attempt), 900)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::JobStatus;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff_secs(0), 30);
        assert_eq!(retry_backoff_secs(1), 60);
        assert_eq!(retry_backoff_secs(2), 120);
        assert_eq!(retry_backoff_secs(10), 900);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn claim_skips_completed_jobs() {
        dotenvy::dotenv().ok();
        let pool = crate::db::create_pool_from_env().await.unwrap();

        let job = enqueue_job(
            &pool,
            &NewReportJob {
                user_id: "claim-test-user".to_string(),
                homepage_url: "https://example.com".to_string(),
                pricing_url: None,
                competitor_urls: vec![],
                traffic_baseline: 500,
                average_deal_size: 8000,
                idempotency_key: None,
            },
        )
        .await
        .unwrap();

        complete_job(&pool, job.id).await.unwrap();

        // A completed job is never claimable again
        while let Some(claimed) = claim_next_job(&pool, 60).await.unwrap() {
            assert_ne!(claimed.id, job.id);
            mark_failed(&pool, claimed.id, "test cleanup").await.unwrap();
        }

        let reloaded = get_job_by_id(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), Some(JobStatus::Completed));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn duplicate_submission_returns_same_job() {
        dotenvy::dotenv().ok();
        let pool = crate::db::create_pool_from_env().await.unwrap();

        let new_job = NewReportJob {
            user_id: "idempotency-test-user".to_string(),
            homepage_url: "https://example.com".to_string(),
            pricing_url: None,
            competitor_urls: vec![],
            traffic_baseline: 500,
            average_deal_size: 8000,
            idempotency_key: Some(format!("key-{}", Uuid::new_v4())),
        };

        let first = enqueue_job(&pool, &new_job).await.unwrap();
        let second = enqueue_job(&pool, &new_job).await.unwrap();

        assert_eq!(first.id, second.id);
    }
}
