//! OpenAI chat client for the generation modules
//!
//! All model calls in the pipeline go through this client. It applies a
//! bounded retry policy with exponential backoff and reports token usage
//! per call so the pipeline can account for cost.

use crate::error::{ReportError, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Per-call output token bound
pub const DEFAULT_MAX_TOKENS: u32 = 1600;

/// Default sampling temperature (low: outputs feed deterministic scoring)
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// USD per 1M prompt tokens / per 1M completion tokens for the default model
const PROMPT_COST_PER_MTOK: f64 = 0.15;
const COMPLETION_COST_PER_MTOK: f64 = 0.60;

/// A fully-built chat request from one of the prompt modules
#[derive(Debug, Clone)]
pub struct ModuleRequest {
    /// Module name (used in logs and schema-validation errors)
    pub name: &'static str,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModuleRequest {
    pub fn new(name: &'static str, system: String, user: String) -> Self {
        Self {
            name,
            system,
            user,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Result of a single chat completion call
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Accumulated token usage across a pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl TokenUsage {
    pub fn record(&mut self, outcome: &ChatOutcome) {
        self.prompt_tokens += u64::from(outcome.prompt_tokens);
        self.completion_tokens += u64::from(outcome.completion_tokens);
        self.estimated_cost_usd += outcome.estimated_cost_usd;
    }

    pub fn merge(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.estimated_cost_usd += other.estimated_cost_usd;
    }
}

/// Bounded retry policy for model calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure (default: 2)
    pub max_extra_attempts: u32,
    /// Initial backoff, doubles each attempt (default: 500ms)
    pub base_delay: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_extra_attempts: 2,
            base_delay: std::time::Duration::from_millis(500),
        }
    }
}

/// Chat client wrapping the OpenAI API
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryPolicy,
}

/// Hard timeout on every completion call; provider defaults are unbounded
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

impl ChatClient {
    /// Create a new chat client
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client: Client::with_config(config).with_http_client(http),
            model: model.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Create client from the OPENAI_API_KEY environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ReportError::ConfigError("OPENAI_API_KEY not set".to_string()))?;

        Ok(Self::new(&api_key, DEFAULT_CHAT_MODEL))
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a module request with bounded retry
    pub async fn run(&self, request: &ModuleRequest) -> Result<ChatOutcome> {
        let mut last_error: Option<ReportError> = None;

        for attempt in 0..=self.retry.max_extra_attempts {
            if attempt > 0 {
                let delay = self.retry.base_delay * 2u32.saturating_pow(attempt - 1);
                warn!(
                    "Model call '{}' attempt {}/{} after {:?}",
                    request.name,
                    attempt + 1,
                    self.retry.max_extra_attempts + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.run_once(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!("Model call '{}' failed: {}", request.name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ReportError::LlmError("model call retries exhausted".to_string())))
    }

    async fn run_once(&self, request: &ModuleRequest) -> Result<ChatOutcome> {
        debug!(
            "Model call '{}': system {} chars, user {} chars",
            request.name,
            request.system.len(),
            request.user.len()
        );

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system.clone())
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user.clone())
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(chat_request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ReportError::LlmError(format!("empty completion for module '{}'", request.name))
            })?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(ChatOutcome {
            content,
            prompt_tokens,
            completion_tokens,
            estimated_cost_usd: estimate_cost_usd(prompt_tokens, completion_tokens),
        })
    }
}

/// Estimate USD cost for a single call
pub fn estimate_cost_usd(prompt_tokens: u32, completion_tokens: u32) -> f64 {
    (f64::from(prompt_tokens) * PROMPT_COST_PER_MTOK
        + f64::from(completion_tokens) * COMPLETION_COST_PER_MTOK)
        / 1_000_000.0
}
