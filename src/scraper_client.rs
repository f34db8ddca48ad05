//! Page fetching for the report pipeline
//!
//! HTTP GET only, with a declared crawler user-agent, a hard request
//! timeout, and bounded retry with exponential backoff. Non-2xx responses
//! and timeouts surface as typed errors the pipeline treats as stage
//! failures, never process-fatal.

use crate::error::{ReportError, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// User-agent declared on every scrape request
const CRAWLER_USER_AGENT: &str = "OptivexIQBot/1.0 (+https://optivexiq.com/bot)";

/// Configuration for the page scraper
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Hard per-request timeout (default: 15 seconds)
    pub request_timeout: Duration,
    /// Connection timeout (default: 10 seconds)
    pub connect_timeout: Duration,
    /// Maximum number of retry attempts (default: 2)
    pub max_retries: u32,
    /// Initial delay between retries (default: 1 second, doubles each retry)
    pub retry_base_delay: Duration,
    /// Maximum delay between retries (default: 8 seconds)
    pub retry_max_delay: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(8),
        }
    }
}

/// Scraper for fetching page HTML
pub struct Scraper {
    client: Client,
    config: ScraperConfig,
}

impl Scraper {
    /// Create a new scraper with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ScraperConfig::default())
    }

    /// Create a new scraper with custom configuration
    pub fn with_config(config: ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(CRAWLER_USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ReportError::FetchError {
                url: "client_init".to_string(),
                source: e,
            })?;

        Ok(Self { client, config })
    }

    /// Fetch a URL and return the HTML content with retry support
    pub async fn fetch(&self, url: &str) -> Result<String> {
        validate_scrape_url(url)?;
        debug!("Fetching URL: {}", url);

        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = std::cmp::min(
                    self.config.retry_base_delay * 2u32.saturating_pow(attempt - 1),
                    self.config.retry_max_delay,
                );
                warn!(
                    "Retry attempt {}/{} for {} after {:?}",
                    attempt, self.config.max_retries, url, delay
                );
                sleep(delay).await;
            }

            match self.fetch_once(url).await {
                Ok(html) => {
                    if attempt > 0 {
                        info!("Successfully fetched {} on attempt {}", url, attempt + 1);
                    }
                    return Ok(html);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "Fetch attempt {} failed for {}: {}",
                        attempt + 1,
                        url,
                        last_error
                    );

                    // 4xx other than 429 will not get better on retry
                    if let ReportError::ScrapeHttpStatus { status, .. } = &e {
                        if (400..500).contains(status) && *status != 429 {
                            return Err(e);
                        }
                    }
                }
            }
        }

        Err(ReportError::RetryExhausted {
            url: url.to_string(),
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }

    /// Single fetch attempt without retry
    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ReportError::ScrapeTimeout {
                    url: url.to_string(),
                }
            } else {
                ReportError::FetchError {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::ScrapeHttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ReportError::ScrapeTimeout {
                    url: url.to_string(),
                }
            } else {
                ReportError::FetchError {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(html)
    }
}

/// Validate a URL before it is accepted for scraping.
///
/// Only absolute http/https URLs with a host are allowed; anything else is
/// an input error that should be rejected at submission, never enqueued.
pub fn validate_scrape_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|_| ReportError::InvalidUrl(url.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ReportError::InvalidUrl(url.to_string()));
    }
    if parsed.host_str().is_none() {
        return Err(ReportError::InvalidUrl(url.to_string()));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scraper_config_default_values() {
        let config = ScraperConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_base_delay, Duration::from_secs(1));
    }

    #[test]
    fn validates_http_and_https_urls() {
        assert!(validate_scrape_url("https://example.com").is_ok());
        assert!(validate_scrape_url("http://example.com/pricing").is_ok());
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(validate_scrape_url("file:///etc/passwd").is_err());
        assert!(validate_scrape_url("ftp://example.com").is_err());
        assert!(validate_scrape_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn rejects_relative_and_malformed_urls() {
        assert!(validate_scrape_url("/pricing").is_err());
        assert!(validate_scrape_url("not a url").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ScraperConfig::default();

        let delay1 = std::cmp::min(
            config.retry_base_delay * 2u32.saturating_pow(0),
            config.retry_max_delay,
        );
        assert_eq!(delay1, Duration::from_secs(1));

        let delay4 = std::cmp::min(
            config.retry_base_delay * 2u32.saturating_pow(3),
            config.retry_max_delay,
        );
        assert_eq!(delay4, Duration::from_secs(8));

        let delay5 = std::cmp::min(
            config.retry_base_delay * 2u32.saturating_pow(4),
            config.retry_max_delay,
        );
        assert_eq!(delay5, Duration::from_secs(8));
    }
}
