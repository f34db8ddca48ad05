//! Job processor: the pipeline stage machine
//!
//! Drives one claimed job through the ordered work stages, committing a
//! checkpoint (stage, progress, accumulated context) after every stage so
//! a retried or reclaimed job resumes from its last completed stage.

use crate::analyzer::{CompetitorAnalyzer, CompetitorInsight};
use crate::db::models::{ExecutionStage, ReportJob, MAX_COMPETITOR_URLS, WORK_STAGES};
use crate::db::{report_jobs, reports, DbPool};
use crate::error::{ReportError, Result};
use crate::extractor::{extract, ExtractedPageContent, SiteContent};
use crate::llm::{ChatClient, ChatOutcome, ModuleRequest, TokenUsage};
use crate::prompts::{
    counter_positioning_request, differentiation_request, gap_analysis_request,
    hero_rewrite_request, objection_request, parse_module_output, pricing_rewrite_request,
    CounterPositioning, DifferentiationPlan, GapAnalysisOutput, HeroRewrite, ObjectionPlan,
    PricingRewrite,
};
use crate::report::{
    build_report, derive_score_inputs, BuildReportInput, ReportProfile, RewriteBundle,
};
use crate::scoring::{calculate_score, ScoreOutcome, ScoringModel};
use crate::scraper_client::Scraper;
use crate::worker::WorkerConfig;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Checkpointed pipeline artifacts, stored in the job's stage_context
/// column after every completed stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    pub homepage: Option<ExtractedPageContent>,
    pub pricing: Option<ExtractedPageContent>,
    pub competitor_pages: Vec<ExtractedPageContent>,
    pub gap_analysis: Option<GapAnalysisOutput>,
    pub insights: Option<Vec<CompetitorInsight>>,
    pub scoring: Option<ScoreOutcome>,
    pub rewrites: Option<RewriteBundle>,
    pub usage: TokenUsage,
}

/// Processor that executes the report pipeline for one job at a time
pub struct JobProcessor {
    config: WorkerConfig,
    scraper: Scraper,
    chat: ChatClient,
}

impl JobProcessor {
    /// Create a new job processor.
    ///
    /// The OpenAI key comes from the argument or OPENAI_API_KEY.
    pub fn new(config: WorkerConfig, openai_api_key: Option<&str>) -> Result<Self> {
        let chat = match openai_api_key {
            Some(key) => ChatClient::new(key, &config.chat_model),
            None => ChatClient::from_env()?,
        };

        Ok(Self {
            config,
            scraper: Scraper::new()?,
            chat,
        })
    }

    /// Process a claimed job through the remaining pipeline stages.
    ///
    /// Returns the stored report id on success. Stage errors propagate to
    /// the runner, which decides between retry and terminal failure.
    pub async fn process(&self, pool: &DbPool, job: &ReportJob) -> Result<Uuid> {
        let mut context = load_context(job)?;
        let start = resume_index(job);

        // Finalizing checkpointed but the completed transition was lost:
        // the report already exists, so just hand its id back
        if start >= WORK_STAGES.len() {
            if let Some(stored) = reports::get_report_by_job(pool, job.id).await? {
                info!("Job {} already finalized, report {}", job.id, stored.id);
                return Ok(stored.id);
            }
        }

        if start > 0 && start < WORK_STAGES.len() {
            info!(
                "Job {} resuming at stage {} (attempt {})",
                job.id,
                WORK_STAGES[start].as_str(),
                job.attempt_count + 1
            );
        }

        let mut report_id: Option<Uuid> = None;

        for stage in WORK_STAGES.iter().skip(start) {
            match stage {
                ExecutionStage::ScrapingHomepage => {
                    let html = self.scraper.fetch(&job.homepage_url).await?;
                    context.homepage = Some(extract(&html, &job.homepage_url));
                }

                ExecutionStage::ScrapingPricing => {
                    if let Some(pricing_url) = &job.pricing_url {
                        let html = self.scraper.fetch(pricing_url).await?;
                        context.pricing = Some(extract(&html, pricing_url));
                    }
                }

                ExecutionStage::ScrapingCompetitors => {
                    context.competitor_pages = self.scrape_competitors(job).await;
                }

                ExecutionStage::GapAnalysis => {
                    let content = site_content(&context)?;
                    let request = gap_analysis_request(
                        &job_profile(job),
                        &context.competitor_pages,
                        &content,
                    );
                    let (gap_analysis, outcome) =
                        self.run_module::<GapAnalysisOutput>(request).await?;
                    context.usage.record(&outcome);
                    context.gap_analysis = Some(gap_analysis);
                }

                ExecutionStage::CompetitorSynthesis => {
                    let analyzer = CompetitorAnalyzer::new(&self.chat);
                    let batch = analyzer.analyze(&context.competitor_pages).await;
                    context.usage.merge(&batch.usage);
                    context.insights = Some(batch.insights);
                }

                ExecutionStage::Scoring => {
                    let gap_analysis = context
                        .gap_analysis
                        .as_ref()
                        .ok_or_else(|| missing_context("gap_analysis"))?;
                    let inputs = derive_score_inputs(gap_analysis);
                    context.scoring = Some(calculate_score(&inputs, &ScoringModel::canonical()));
                }

                ExecutionStage::RewriteGeneration => {
                    let rewrites = self.generate_rewrites(job, &mut context).await?;
                    context.rewrites = Some(rewrites);
                }

                ExecutionStage::Finalizing => {
                    report_id = Some(self.finalize(pool, job, &context).await?);
                }

                // Not work stages; never reached from WORK_STAGES
                ExecutionStage::Queued | ExecutionStage::Complete | ExecutionStage::Failed => {}
            }

            let context_json = serde_json::to_value(&context)?;
            report_jobs::checkpoint_stage(
                pool,
                job.id,
                *stage,
                stage.progress_after(),
                &context_json,
                self.config.lease_secs,
            )
            .await?;
        }

        report_id.ok_or_else(|| missing_context("report"))
    }

    /// Scrape competitor pages concurrently; a failed fetch is skipped
    /// rather than failing the stage
    async fn scrape_competitors(&self, job: &ReportJob) -> Vec<ExtractedPageContent> {
        let urls: Vec<String> = job
            .competitor_urls()
            .into_iter()
            .take(MAX_COMPETITOR_URLS)
            .collect();

        let futures = urls.iter().map(|url| async move {
            (url.clone(), self.scraper.fetch(url).await)
        });

        let mut pages = Vec::new();
        for (url, result) in join_all(futures).await {
            match result {
                Ok(html) => pages.push(extract(&html, &url)),
                Err(e) => warn!("Skipping competitor {}: {}", url, e),
            }
        }
        pages
    }

    /// Run the five generation modules concurrently; any schema-validation
    /// failure fails the stage and the whole stage is retried
    async fn generate_rewrites(
        &self,
        job: &ReportJob,
        context: &mut PipelineContext,
    ) -> Result<RewriteBundle> {
        let profile = job_profile(job);
        let content = site_content(context)?;
        let insights = context.insights.clone().unwrap_or_default();

        let (hero, pricing, objections, differentiation, counters) = tokio::try_join!(
            self.run_module::<HeroRewrite>(hero_rewrite_request(&profile, &insights, &content)),
            self.run_module::<PricingRewrite>(pricing_rewrite_request(
                &profile, &insights, &content
            )),
            self.run_module::<ObjectionPlan>(objection_request(&profile, &insights, &content)),
            self.run_module::<DifferentiationPlan>(differentiation_request(
                &profile, &insights, &content
            )),
            self.run_module::<CounterPositioning>(counter_positioning_request(
                &profile, &insights, &content
            )),
        )?;

        for outcome in [&hero.1, &pricing.1, &objections.1, &differentiation.1, &counters.1] {
            context.usage.record(outcome);
        }

        Ok(RewriteBundle {
            hero: hero.0,
            pricing: pricing.0,
            objections: objections.0,
            differentiation: differentiation.0,
            counters: counters.0,
        })
    }

    /// Build and persist the canonical report
    async fn finalize(
        &self,
        pool: &DbPool,
        job: &ReportJob,
        context: &PipelineContext,
    ) -> Result<Uuid> {
        let report = build_report(BuildReportInput {
            profile: job_profile(job),
            content: site_content(context)?,
            competitors: context.insights.clone().unwrap_or_default(),
            gap_analysis: context
                .gap_analysis
                .clone()
                .ok_or_else(|| missing_context("gap_analysis"))?,
            rewrites: context
                .rewrites
                .clone()
                .ok_or_else(|| missing_context("rewrites"))?,
            usage: context.usage.clone(),
        })?;

        reports::insert_report(pool, job.id, &job.user_id, &report).await
    }

    async fn run_module<T: DeserializeOwned>(
        &self,
        request: ModuleRequest,
    ) -> Result<(T, ChatOutcome)> {
        let outcome = self.chat.run(&request).await?;
        let parsed = parse_module_output(request.name, &outcome.content)?;
        Ok((parsed, outcome))
    }
}

/// Deserialize the checkpointed context, empty for a fresh job
fn load_context(job: &ReportJob) -> Result<PipelineContext> {
    match &job.stage_context {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(PipelineContext::default()),
    }
}

/// Index of the first stage still to run.
///
/// execution_stage records the last completed stage, so a job that failed
/// mid-stage resumes at that same stage, not from the beginning.
fn resume_index(job: &ReportJob) -> usize {
    job.stage()
        .and_then(|stage| stage.work_index())
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

fn site_content(context: &PipelineContext) -> Result<SiteContent> {
    let homepage = context
        .homepage
        .clone()
        .ok_or_else(|| missing_context("homepage"))?;

    Ok(SiteContent {
        homepage,
        pricing: context.pricing.clone(),
    })
}

fn job_profile(job: &ReportJob) -> ReportProfile {
    ReportProfile {
        company: None,
        homepage_url: job.homepage_url.clone(),
        segment: None,
        traffic_baseline: job.traffic_baseline,
        average_deal_size: job.average_deal_size,
    }
}

/// A checkpoint that should exist is missing: corrupted context, terminal
fn missing_context(what: &str) -> ReportError {
    ReportError::ConfigError(format!("checkpointed {what} missing from stage context"))
}
