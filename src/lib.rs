//! Gap Report Builder - a service for analyzing websites against
//! competitors and generating conversion gap reports
//!
//! The pipeline scrapes the submitted site and its competitors, runs a set
//! of generation modules against an LLM, scores the results with a
//! versioned deterministic model, and persists one canonical report per
//! job. Jobs live in Postgres and are driven by a polling worker with
//! atomic claiming, per-stage checkpoints, and bounded retries.

pub mod analyzer;
pub mod api;
pub mod db;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod prompts;
pub mod report;
pub mod revenue;
pub mod sanitizer;
pub mod scoring;
pub mod scraper_client;
pub mod worker;

pub use analyzer::{CompetitorAnalyzer, CompetitorBatch, CompetitorInsight};
pub use error::{ReportError, Result};
pub use extractor::{extract, ExtractedPageContent, SiteContent};
pub use report::{build_report, BuildReportInput, ConversionGapReport, ReportProfile};
pub use scoring::{calculate_score, ScoringModel, CANONICAL_SCORING_MODEL_VERSION};
pub use scraper_client::{Scraper, ScraperConfig};

use crate::db::models::MAX_COMPETITOR_URLS;
use crate::llm::{ChatClient, TokenUsage};
use crate::prompts::{
    counter_positioning_request, differentiation_request, gap_analysis_request,
    hero_rewrite_request, objection_request, parse_module_output, pricing_rewrite_request,
    COUNTER_MODULE, DIFFERENTIATION_MODULE, GAP_ANALYSIS_MODULE, HERO_REWRITE_MODULE,
    OBJECTION_MODULE, PRICING_REWRITE_MODULE,
};
use crate::report::{RewriteBundle, DEFAULT_AVERAGE_DEAL_SIZE, DEFAULT_TRAFFIC_BASELINE};
use tracing::{info, warn};

/// Inputs for a one-shot report run (CLI mode, no database)
#[derive(Debug, Clone)]
pub struct OneShotRequest {
    pub company: Option<String>,
    pub segment: Option<String>,
    pub homepage_url: String,
    pub pricing_url: Option<String>,
    pub competitor_urls: Vec<String>,
}

/// Run the full pipeline once without queueing.
///
/// This is the CLI entry point; the worker runs the same stages through
/// the checkpointing processor instead.
pub async fn build_report_once(request: OneShotRequest) -> Result<ConversionGapReport> {
    let scraper = Scraper::new()?;
    let chat = ChatClient::from_env()?;
    let mut usage = TokenUsage::default();

    // Step 1: Scrape the site and its competitors
    info!("Step 1: Scraping {}...", request.homepage_url);
    let html = scraper.fetch(&request.homepage_url).await?;
    let homepage = extract(&html, &request.homepage_url);

    let pricing = match &request.pricing_url {
        Some(url) => {
            let html = scraper.fetch(url).await?;
            Some(extract(&html, url))
        }
        None => None,
    };

    let mut competitor_pages = Vec::new();
    for url in request.competitor_urls.iter().take(MAX_COMPETITOR_URLS) {
        match scraper.fetch(url).await {
            Ok(html) => competitor_pages.push(extract(&html, url)),
            Err(e) => warn!("Skipping competitor {}: {}", url, e),
        }
    }

    let content = SiteContent { homepage, pricing };
    let profile = ReportProfile {
        company: request.company.clone(),
        homepage_url: request.homepage_url.clone(),
        segment: request.segment.clone(),
        traffic_baseline: DEFAULT_TRAFFIC_BASELINE,
        average_deal_size: DEFAULT_AVERAGE_DEAL_SIZE,
    };

    // Step 2: Gap analysis against raw competitor pages
    info!("Step 2: Running gap analysis...");
    let outcome = chat
        .run(&gap_analysis_request(&profile, &competitor_pages, &content))
        .await?;
    usage.record(&outcome);
    let gap_analysis = parse_module_output(GAP_ANALYSIS_MODULE, &outcome.content)?;

    // Step 3: Competitor synthesis
    info!("Step 3: Synthesizing competitor insight...");
    let batch = CompetitorAnalyzer::new(&chat).analyze(&competitor_pages).await;
    usage.merge(&batch.usage);
    let insights = batch.insights;

    // Step 4: Generation modules
    info!("Step 4: Generating rewrites...");
    let outcome = chat
        .run(&hero_rewrite_request(&profile, &insights, &content))
        .await?;
    usage.record(&outcome);
    let hero = parse_module_output(HERO_REWRITE_MODULE, &outcome.content)?;

    let outcome = chat
        .run(&pricing_rewrite_request(&profile, &insights, &content))
        .await?;
    usage.record(&outcome);
    let pricing_rewrite = parse_module_output(PRICING_REWRITE_MODULE, &outcome.content)?;

    let outcome = chat
        .run(&objection_request(&profile, &insights, &content))
        .await?;
    usage.record(&outcome);
    let objections = parse_module_output(OBJECTION_MODULE, &outcome.content)?;

    let outcome = chat
        .run(&differentiation_request(&profile, &insights, &content))
        .await?;
    usage.record(&outcome);
    let differentiation = parse_module_output(DIFFERENTIATION_MODULE, &outcome.content)?;

    let outcome = chat
        .run(&counter_positioning_request(&profile, &insights, &content))
        .await?;
    usage.record(&outcome);
    let counters = parse_module_output(COUNTER_MODULE, &outcome.content)?;

    // Step 5: Aggregate and score
    info!("Step 5: Building report...");
    let report = build_report(BuildReportInput {
        profile,
        content,
        competitors: insights,
        gap_analysis,
        rewrites: RewriteBundle {
            hero,
            pricing: pricing_rewrite,
            objections,
            differentiation,
            counters,
        },
        usage,
    })?;

    info!(
        "Report built for {}: gap score {}",
        report.company, report.conversion_score
    );
    Ok(report)
}
