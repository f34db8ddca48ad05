//! Gap Report Builder CLI
//!
//! Runs the service in one of three modes: a one-shot report build, the
//! polling worker (claiming report_jobs), or the HTTP API server. The
//! migrate subcommand applies pending database migrations.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gap_report_builder::api::{serve, ApiState};
use gap_report_builder::db::{create_pool_from_env, report_jobs, run_migrations};
use gap_report_builder::worker::{setup_signal_handler, JobProcessor, JobRunner, WorkerConfig};
use gap_report_builder::{build_report_once, OneShotRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gap-report-builder")]
#[command(about = "Analyze a website against competitors and generate a conversion gap report")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline once for a URL and print the report as JSON
    Build {
        /// Homepage URL to analyze
        #[arg(short = 'u', long)]
        url: String,

        /// Pricing page URL
        #[arg(short, long)]
        pricing_url: Option<String>,

        /// Competitor URLs (up to 5)
        #[arg(short, long)]
        competitor: Vec<String>,

        /// Company name (derived from the hostname if not provided)
        #[arg(long)]
        company: Option<String>,

        /// Market segment used in prompts
        #[arg(long)]
        segment: Option<String>,
    },

    /// Run as worker, polling the report_jobs table
    Worker {
        /// Poll interval in seconds (default: 5)
        #[arg(short, long, default_value = "5")]
        poll_interval: u64,

        /// Run once and exit (for testing)
        #[arg(long)]
        once: bool,

        /// Job timeout in seconds (default: 300)
        #[arg(short, long, default_value = "300")]
        timeout: u64,
    },

    /// Serve the submission/status/dispatch API
    Serve {
        /// Port to listen on (default: 8080, or PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Build {
            url,
            pricing_url,
            competitor,
            company,
            segment,
        } => {
            info!("Building report for: {}", url);

            let report = build_report_once(OneShotRequest {
                company,
                segment,
                homepage_url: url,
                pricing_url,
                competitor_urls: competitor,
            })
            .await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Worker {
            poll_interval,
            once,
            timeout,
        } => {
            info!("Initializing worker...");

            let pool = create_pool_from_env().await?;
            info!("Database connection established");

            let config = WorkerConfig::builder()
                .poll_interval_secs(poll_interval)
                .job_timeout(Duration::from_secs(timeout))
                .build();

            let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
            let processor = JobProcessor::new(config.clone(), openai_api_key.as_deref())?;
            let runner = JobRunner::new(pool, config, processor);

            if once {
                info!("Running in single-job mode...");
                match runner.run_once().await {
                    Ok(true) => println!("Job processed"),
                    Ok(false) => println!("No claimable jobs found"),
                    Err(e) => {
                        eprintln!("Error processing job: {}", e);
                        return Err(e.into());
                    }
                }
            } else {
                let shutdown = runner.shutdown_handle();
                setup_signal_handler(shutdown);
                runner.run().await?;
            }
        }

        Commands::Serve { port } => {
            let pool = create_pool_from_env().await?;
            info!("Database connection established");

            let sweep_token = std::env::var("SWEEP_AUTH_TOKEN")
                .map_err(|_| anyhow::anyhow!("SWEEP_AUTH_TOKEN not set"))?;
            let port = port
                .or_else(|| {
                    std::env::var("PORT")
                        .ok()
                        .and_then(|value| value.parse().ok())
                })
                .unwrap_or(8080);

            let config = WorkerConfig::default();
            let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
            let processor = JobProcessor::new(config.clone(), openai_api_key.as_deref())?;
            let runner = JobRunner::new(pool.clone(), config.clone(), processor);

            let state = ApiState {
                pool,
                runner: Arc::new(runner),
                sweep_token,
                sweep_batch_size: config.sweep_batch_size,
                stale_queued_secs: config.stale_queued_secs,
            };

            serve(state, port).await?;
        }

        Commands::Migrate => {
            let pool = create_pool_from_env().await?;
            run_migrations(&pool).await?;
            let claimable = report_jobs::count_claimable_jobs(&pool).await?;
            println!("Migrations applied; {} claimable job(s) in queue", claimable);
        }
    }

    Ok(())
}
