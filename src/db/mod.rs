//! Database module for gap-report-builder
//!
//! Provides PostgreSQL operations for report_jobs and reports. The job row
//! is the single shared mutable resource in the system; all worker
//! coordination goes through its status/stage/lease columns.

pub mod connection;
pub mod models;
pub mod report_jobs;
pub mod reports;

pub use connection::{create_pool, create_pool_from_env, run_migrations, DbPool};
pub use models::*;
