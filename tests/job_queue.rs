//! Job queue state machine integration tests
//!
//! These run against a real Postgres (a dedicated test database; they
//! claim and mutate arbitrary queued jobs) and are ignored by default:
//!
//!   DATABASE_URL=postgres://localhost/gap_report_builder_test \
//!     cargo test --test job_queue -- --ignored

use gap_report_builder::db::models::{JobStatus, NewReportJob};
use gap_report_builder::db::{create_pool_from_env, report_jobs, run_migrations, DbPool};
use uuid::Uuid;

async fn test_pool() -> DbPool {
    dotenvy::dotenv().ok();
    let pool = create_pool_from_env().await.expect("DATABASE_URL must point at a test database");
    run_migrations(&pool).await.expect("migrations apply");
    pool
}

fn unique_job() -> NewReportJob {
    NewReportJob {
        user_id: format!("it-user-{}", Uuid::new_v4()),
        homepage_url: "https://example.com".to_string(),
        pricing_url: None,
        competitor_urls: vec![],
        traffic_baseline: 500,
        average_deal_size: 8_000,
        idempotency_key: None,
    }
}

/// Claim jobs until ours comes up, failing the rest out of the queue
async fn claim_job(pool: &DbPool, id: Uuid) -> Option<gap_report_builder::db::models::ReportJob> {
    while let Some(job) = report_jobs::claim_next_job(pool, 60).await.unwrap() {
        if job.id == id {
            return Some(job);
        }
        report_jobs::mark_failed(pool, job.id, "test cleanup").await.unwrap();
    }
    None
}

#[tokio::test]
#[ignore] // Requires database
async fn retried_job_resumes_at_failed_stage() {
    let pool = test_pool().await;

    let job = report_jobs::enqueue_job(&pool, &unique_job()).await.unwrap();
    let claimed = claim_job(&pool, job.id).await.expect("job is claimable");
    assert_eq!(claimed.status(), Some(JobStatus::Running));
    assert!(claimed.started_at.is_some());

    // Checkpoint gap_analysis as completed, then fail the next stage
    let context = serde_json::json!({"competitor_pages": [], "usage": {
        "prompt_tokens": 100, "completion_tokens": 50, "estimated_cost_usd": 0.001
    }});
    report_jobs::checkpoint_stage(
        &pool,
        job.id,
        gap_report_builder::db::models::ExecutionStage::GapAnalysis,
        50,
        &context,
        60,
    )
    .await
    .unwrap();
    report_jobs::mark_retrying(&pool, job.id, "competitor synthesis blew up", 0).await.unwrap();

    // The retried claim resumes at the checkpointed stage, not from scratch
    let reclaimed = claim_job(&pool, job.id).await.expect("retrying job is claimable");
    assert_eq!(reclaimed.execution_stage, "gap_analysis");
    assert_eq!(reclaimed.execution_progress, 50);
    assert_eq!(reclaimed.attempt_count, 1);
    assert_eq!(
        reclaimed.stage_context.as_ref().unwrap()["usage"]["prompt_tokens"],
        100
    );

    report_jobs::mark_failed(&pool, job.id, "test cleanup").await.unwrap();
}

#[tokio::test]
#[ignore] // Requires database
async fn expired_lease_is_reclaimable() {
    let pool = test_pool().await;

    let job = report_jobs::enqueue_job(&pool, &unique_job()).await.unwrap();

    // Claim with a zero-second lease: the lease is expired immediately
    let claimed = {
        let mut found = None;
        while let Some(candidate) = report_jobs::claim_next_job(&pool, 0).await.unwrap() {
            if candidate.id == job.id {
                found = Some(candidate);
                break;
            }
            report_jobs::mark_failed(&pool, candidate.id, "test cleanup").await.unwrap();
        }
        found.expect("job is claimable")
    };
    assert_eq!(claimed.status(), Some(JobStatus::Running));

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    // A stuck running job with an expired lease is claimed again
    let reclaimed = claim_job(&pool, job.id).await.expect("expired lease reclaimable");
    assert_eq!(reclaimed.status(), Some(JobStatus::Running));

    report_jobs::mark_failed(&pool, job.id, "test cleanup").await.unwrap();
}

#[tokio::test]
#[ignore] // Requires database
async fn completed_and_failed_jobs_stay_terminal() {
    let pool = test_pool().await;

    let done = report_jobs::enqueue_job(&pool, &unique_job()).await.unwrap();
    let claimed = claim_job(&pool, done.id).await.expect("claimable");
    report_jobs::complete_job(&pool, claimed.id).await.unwrap();

    let failed = report_jobs::enqueue_job(&pool, &unique_job()).await.unwrap();
    let claimed = claim_job(&pool, failed.id).await.expect("claimable");
    report_jobs::mark_failed(&pool, claimed.id, "boom").await.unwrap();

    // Neither terminal job ever comes back from a claim
    assert!(claim_job(&pool, done.id).await.is_none());
    assert!(claim_job(&pool, failed.id).await.is_none());

    let done = report_jobs::get_job_by_id(&pool, done.id).await.unwrap().unwrap();
    assert_eq!(done.status(), Some(JobStatus::Completed));
    assert_eq!(done.execution_progress, 100);

    let failed = report_jobs::get_job_by_id(&pool, failed.id).await.unwrap().unwrap();
    assert_eq!(failed.status(), Some(JobStatus::Failed));
    assert_eq!(failed.error.as_deref(), Some("boom"));
}
