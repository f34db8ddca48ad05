//! Canonical report persistence
//!
//! A report is written exactly once, when its job reaches the finalizing
//! stage, and is immutable afterwards. Re-running an analysis creates a
//! new job/report pair.

use crate::db::models::StoredReport;
use crate::db::DbPool;
use crate::error::Result;
use crate::report::ConversionGapReport;
use uuid::Uuid;

/// Insert a finished report for a job
pub async fn insert_report(
    pool: &DbPool,
    job_id: Uuid,
    user_id: &str,
    report: &ConversionGapReport,
) -> Result<Uuid> {
    let payload = serde_json::to_value(report)?;

    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO reports (id, job_id, user_id, payload)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (job_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(report.id)
    .bind(job_id)
    .bind(user_id)
    .bind(&payload)
    .fetch_optional(pool)
    .await?;

    match id {
        Some(id) => Ok(id),
        // A retried finalizing stage re-inserted; keep the original
        None => {
            let existing = get_report_by_job(pool, job_id).await?;
            Ok(existing.map(|r| r.id).unwrap_or(report.id))
        }
    }
}

/// Get the stored report for a job, if the job has completed
pub async fn get_report_by_job(pool: &DbPool, job_id: Uuid) -> Result<Option<StoredReport>> {
    let report = sqlx::query_as::<_, StoredReport>("SELECT * FROM reports WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    // Report persistence is exercised by the #[ignore]d worker integration
    // tests in tests/ - it needs a database and a completed pipeline run.
}
