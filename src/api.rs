//! HTTP API: report submission, status polling, and worker dispatch
//!
//! The API trusts the fronting proxy's X-User-Id header for the requesting
//! principal; verifying it is the auth layer's job. The sweep endpoint is
//! for the external cron scheduler and is guarded by a shared secret.

use crate::db::models::{JobStatus, NewReportJob, MAX_COMPETITOR_URLS};
use crate::db::{report_jobs, reports, DbPool};
use crate::report::{DEFAULT_AVERAGE_DEAL_SIZE, DEFAULT_TRAFFIC_BASELINE};
use crate::scraper_client::validate_scrape_url;
use crate::worker::JobRunner;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

/// Message shown for terminally failed jobs; raw error strings stay internal
const FAILED_MESSAGE: &str = "analysis failed";

#[derive(Clone)]
pub struct ApiState {
    pub pool: DbPool,
    pub runner: Arc<JobRunner>,
    pub sweep_token: String,
    pub sweep_batch_size: usize,
    pub stale_queued_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub homepage_url: String,
    #[serde(default)]
    pub pricing_url: Option<String>,
    #[serde(default)]
    pub competitor_urls: Vec<String>,
    #[serde(default)]
    pub traffic_baseline: Option<i64>,
    #[serde(default)]
    pub average_deal_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateReportResponse {
    pub report_id: Uuid,
    pub status: String,
}

/// Execution payload returned to polling clients
#[derive(Debug, Serialize)]
pub struct ExecutionPayload {
    pub id: Uuid,
    pub status: String,
    pub execution_stage: String,
    pub execution_progress: i16,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub report: Option<serde_json::Value>,
}

pub fn app(state: ApiState) -> Router {
    Router::new()
        .route("/reports", post(create_report_handler))
        .route("/reports/:id", get(report_execution_handler))
        .route("/internal/sweep", post(sweep_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(Arc::new(state))
}

/// Bind and serve until the process exits
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("API listening on port {}", port);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn create_report_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateReportRequest>,
) -> Response {
    let Some(user_id) = header_value(&headers, "x-user-id") else {
        return bad_request("missing X-User-Id header");
    };

    if let Err(e) = validate_scrape_url(&payload.homepage_url) {
        return bad_request(&e.to_string());
    }
    if let Some(pricing_url) = &payload.pricing_url {
        if let Err(e) = validate_scrape_url(pricing_url) {
            return bad_request(&e.to_string());
        }
    }
    if payload.competitor_urls.len() > MAX_COMPETITOR_URLS {
        let err = crate::error::ReportError::TooManyCompetitors(payload.competitor_urls.len());
        return bad_request(&err.to_string());
    }
    for url in &payload.competitor_urls {
        if let Err(e) = validate_scrape_url(url) {
            return bad_request(&e.to_string());
        }
    }

    let new_job = NewReportJob {
        user_id,
        homepage_url: payload.homepage_url,
        pricing_url: payload.pricing_url,
        competitor_urls: payload.competitor_urls,
        traffic_baseline: payload.traffic_baseline.unwrap_or(DEFAULT_TRAFFIC_BASELINE),
        average_deal_size: payload
            .average_deal_size
            .unwrap_or(DEFAULT_AVERAGE_DEAL_SIZE),
        idempotency_key: header_value(&headers, "idempotency-key"),
    };

    match report_jobs::enqueue_job(&state.pool, &new_job).await {
        Ok(job) => {
            // Opportunistic dispatch so the job doesn't wait for the next
            // cron tick
            dispatch_worker(&state);

            (
                StatusCode::ACCEPTED,
                Json(CreateReportResponse {
                    report_id: job.id,
                    status: job.status,
                }),
            )
                .into_response()
        }
        Err(e) => server_error(&e.to_string()),
    }
}

async fn report_execution_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = header_value(&headers, "x-user-id") else {
        return bad_request("missing X-User-Id header");
    };

    let job = match report_jobs::get_job_by_id(&state.pool, id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "not_found"})),
            )
                .into_response()
        }
        Err(e) => return server_error(&e.to_string()),
    };

    if job.user_id != user_id {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "forbidden"})),
        )
            .into_response();
    }

    // Compensate for missed cron ticks: a job stuck in queued past the
    // staleness threshold gets a dispatch right from the status probe
    if job.is_stale_queued(chrono::Duration::seconds(state.stale_queued_secs)) {
        warn!("Job {} stale in queue, dispatching worker", job.id);
        dispatch_worker(&state);
    }

    let completed = job.status() == Some(JobStatus::Completed);
    let failed = job.status() == Some(JobStatus::Failed);

    let report = if completed {
        match reports::get_report_by_job(&state.pool, job.id).await {
            Ok(stored) => stored.map(|r| r.payload),
            Err(e) => return server_error(&e.to_string()),
        }
    } else {
        None
    };

    Json(ExecutionPayload {
        id: job.id,
        status: job.status,
        execution_stage: job.execution_stage,
        execution_progress: job.execution_progress,
        started_at: job.started_at,
        updated_at: job.updated_at,
        completed_at: job.completed_at,
        error: failed.then(|| FAILED_MESSAGE.to_string()),
        report,
    })
    .into_response()
}

async fn sweep_handler(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let authorized = header_value(&headers, "authorization")
        .map(|value| value == format!("Bearer {}", state.sweep_token))
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response();
    }

    match state.runner.sweep(state.sweep_batch_size).await {
        Ok(processed) => Json(serde_json::json!({"processed": processed})).into_response(),
        Err(e) => server_error(&e.to_string()),
    }
}

async fn healthz_handler(State(state): State<Arc<ApiState>>) -> Response {
    match report_jobs::count_claimable_jobs(&state.pool).await {
        Ok(count) => Json(serde_json::json!({
            "status": "ok",
            "claimable_jobs": count,
        }))
        .into_response(),
        Err(e) => server_error(&e.to_string()),
    }
}

fn dispatch_worker(state: &Arc<ApiState>) {
    let runner = Arc::clone(&state.runner);
    tokio::spawn(async move {
        if let Err(e) = runner.run_once().await {
            warn!("Opportunistic dispatch failed: {}", e);
        }
    });
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn server_error(message: &str) -> Response {
    warn!("Internal error: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "internal_error"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{JobProcessor, WorkerConfig};
    use axum::body::Body;
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    /// State with a lazy pool: requests that stop before touching the
    /// database (validation, auth) run without one
    fn test_state() -> ApiState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/gap_report_builder_test")
            .unwrap();
        let config = WorkerConfig::default();
        let processor = JobProcessor::new(config.clone(), Some("test-key")).unwrap();
        let runner = JobRunner::new(pool.clone(), config, processor);

        ApiState {
            pool,
            runner: Arc::new(runner),
            sweep_token: "sweep-secret".to_string(),
            sweep_batch_size: 5,
            stale_queued_secs: 120,
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-id", "user-1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn submit_without_user_header_is_rejected() {
        let app = app(test_state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/reports")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"homepage_url": "https://acme.example"}).to_string(),
            ))
            .unwrap();

        let resp = app.oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_rejects_invalid_homepage_url() {
        let app = app(test_state());
        let resp = app
            .oneshot(post_json(
                "/reports",
                serde_json::json!({"homepage_url": "ftp://acme.example"}),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Invalid URL"));
    }

    #[tokio::test]
    async fn submit_rejects_too_many_competitors() {
        let urls: Vec<String> = (0..6)
            .map(|i| format!("https://competitor{i}.example"))
            .collect();
        let app = app(test_state());
        let resp = app
            .oneshot(post_json(
                "/reports",
                serde_json::json!({
                    "homepage_url": "https://acme.example",
                    "competitor_urls": urls,
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sweep_requires_bearer_token() {
        let app = app(test_state());
        let resp = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/internal/sweep")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/internal/sweep")
                    .header("authorization", "Bearer wrong-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
