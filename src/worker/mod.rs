//! Worker module for polling and processing report_jobs
//!
//! This module provides:
//! - JobRunner: Main worker loop that claims and drives pending jobs
//! - JobProcessor: Executes the pipeline stage machine for one job
//! - WorkerConfig: Configuration for the worker

pub mod config;
pub mod processor;
pub mod runner;

pub use config::WorkerConfig;
pub use processor::{JobProcessor, PipelineContext};
pub use runner::{setup_signal_handler, JobRunner};
