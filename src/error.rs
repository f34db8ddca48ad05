//! Error types for gap-report-builder

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to fetch URL: {url}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for URL: {url}")]
    ScrapeHttpStatus { url: String, status: u16 },

    #[error("Timed out fetching URL: {url}")]
    ScrapeTimeout { url: String },

    #[error("Failed to fetch URL after {attempts} attempts: {url} (last error: {last_error})")]
    RetryExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many competitor URLs: {0} (maximum: 5)")]
    TooManyCompetitors(usize),

    #[error("Model provider error: {0}")]
    LlmError(String),

    #[error("Module '{module}' returned output that failed schema validation: {message}")]
    SchemaValidation { module: String, message: String },

    #[error("Could not resolve a company name from the submitted input")]
    CompanyResolutionFailed,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("OpenAI API error: {0}")]
    OpenAiError(#[from] async_openai::error::OpenAIError),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Job timed out")]
    JobTimeout,
}

impl ReportError {
    /// Whether this error should trigger a retry of the failed stage.
    ///
    /// Transient errors move the job to `retrying` at the same stage;
    /// everything else exhausts the current attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ReportError::FetchError { .. } => true,
            ReportError::ScrapeTimeout { .. } => true,
            ReportError::ScrapeHttpStatus { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }
            ReportError::RetryExhausted { .. } => true,
            ReportError::LlmError(_) => true,
            ReportError::SchemaValidation { .. } => true,
            ReportError::OpenAiError(_) => true,
            ReportError::DatabaseError(_) => true,
            ReportError::JobTimeout => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
