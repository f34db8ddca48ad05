//! Competitor insight extraction
//!
//! Turns extracted competitor page content into structured insight via one
//! model call per competitor. Calls fan out concurrently, and a failed
//! extraction is isolated to its own item: it yields an error-flagged
//! insight instead of sinking the whole batch.

use crate::error::Result;
use crate::extractor::ExtractedPageContent;
use crate::llm::{ChatClient, ChatOutcome, ModuleRequest, TokenUsage};
use crate::prompts::parse_module_output;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

pub const COMPETITOR_INSIGHT_MODULE: &str = "competitor_insight";

/// Structured insight about a single competitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorInsight {
    pub name: String,
    pub url: String,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub positioning: String,
    /// True when extraction failed for this competitor; analysis fields
    /// are empty and downstream modules skip it
    #[serde(default)]
    pub error: bool,
}

/// Result of analyzing a batch of competitors
#[derive(Debug, Clone)]
pub struct CompetitorBatch {
    pub insights: Vec<CompetitorInsight>,
    pub usage: TokenUsage,
}

impl CompetitorBatch {
    /// Competitors whose extraction succeeded
    pub fn usable(&self) -> usize {
        self.insights.iter().filter(|i| !i.error).count()
    }
}

/// Schema for the per-competitor extraction call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompetitorExtraction {
    summary: String,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    positioning: String,
}

/// Analyzer that extracts competitor insight with the chat client
pub struct CompetitorAnalyzer<'a> {
    client: &'a ChatClient,
}

impl<'a> CompetitorAnalyzer<'a> {
    pub fn new(client: &'a ChatClient) -> Self {
        Self { client }
    }

    /// Analyze a batch of competitor pages concurrently.
    ///
    /// Every input yields exactly one insight; failures are flagged
    /// per item rather than aborting the batch.
    pub async fn analyze(&self, contents: &[ExtractedPageContent]) -> CompetitorBatch {
        let futures = contents
            .iter()
            .map(|content| self.analyze_one(content))
            .collect::<Vec<_>>();

        let results = join_all(futures).await;

        let mut insights = Vec::with_capacity(results.len());
        let mut usage = TokenUsage::default();
        for (insight, outcome) in results {
            if let Some(outcome) = outcome {
                usage.record(&outcome);
            }
            insights.push(insight);
        }

        info!(
            "Competitor analysis complete: {}/{} extractions succeeded",
            insights.iter().filter(|i| !i.error).count(),
            insights.len()
        );

        CompetitorBatch { insights, usage }
    }

    async fn analyze_one(
        &self,
        content: &ExtractedPageContent,
    ) -> (CompetitorInsight, Option<ChatOutcome>) {
        let name = display_name(&content.url);

        match self.extract(content).await {
            Ok((extraction, outcome)) => (
                CompetitorInsight {
                    name,
                    url: content.url.clone(),
                    summary: extraction.summary,
                    strengths: extraction.strengths,
                    weaknesses: extraction.weaknesses,
                    positioning: extraction.positioning,
                    error: false,
                },
                Some(outcome),
            ),
            Err(e) => {
                warn!("Competitor extraction failed for {}: {}", content.url, e);
                (
                    CompetitorInsight {
                        name,
                        url: content.url.clone(),
                        summary: String::new(),
                        strengths: vec![],
                        weaknesses: vec![],
                        positioning: String::new(),
                        error: true,
                    },
                    None,
                )
            }
        }
    }

    async fn extract(
        &self,
        content: &ExtractedPageContent,
    ) -> Result<(CompetitorExtraction, ChatOutcome)> {
        let request = build_extraction_request(content);
        let outcome = self.client.run(&request).await?;
        let extraction = parse_module_output(COMPETITOR_INSIGHT_MODULE, &outcome.content)?;
        Ok((extraction, outcome))
    }
}

fn build_extraction_request(content: &ExtractedPageContent) -> ModuleRequest {
    let user = format!(
        r#"## Competitor Page

URL: {url}
Headline: {headline}
Subheadline: {subheadline}
Pricing tables:
{pricing}

Page text (truncated):
{raw}

---

Summarize this competitor's value proposition, strengths, weaknesses, and
market positioning as a buyer comparing vendors would see them.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "summary": "One-paragraph summary of the offer",
  "strengths": ["Strength"],
  "weaknesses": ["Weakness"],
  "positioning": "One-line positioning statement"
}}
```
"#,
        url = content.url,
        headline = content.headline.as_deref().unwrap_or("N/A"),
        subheadline = content.subheadline.as_deref().unwrap_or("N/A"),
        pricing = content.pricing_table_text.as_deref().unwrap_or("N/A"),
        raw = content.raw_text,
    );

    ModuleRequest::new(
        COMPETITOR_INSIGHT_MODULE,
        "You are a competitive intelligence analyst. You describe vendors factually from their own websites. You respond only with JSON.".to_string(),
        user,
    )
}

/// Derive a display name from a URL hostname, stripping `www.`
pub fn display_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .map(|h| h.trim_start_matches("www.").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_www() {
        assert_eq!(display_name("https://www.rival.example/pricing"), "rival.example");
        assert_eq!(display_name("https://rival.example"), "rival.example");
    }

    #[test]
    fn display_name_handles_garbage() {
        assert_eq!(display_name("not a url"), "unknown");
    }

    #[test]
    fn extraction_request_is_deterministic() {
        let content = ExtractedPageContent {
            url: "https://rival.example".to_string(),
            headline: Some("The all-in-one CRM".to_string()),
            subheadline: None,
            pricing_table_text: Some("Starter $10/mo".to_string()),
            faq_blocks: vec![],
            raw_text: "The all-in-one CRM".to_string(),
        };

        let a = build_extraction_request(&content);
        let b = build_extraction_request(&content);
        assert_eq!(a.user, b.user);
        assert!(a.user.contains("rival.example"));
        assert!(a.user.contains("Starter $10/mo"));
    }

    #[test]
    fn batch_counts_usable_insights() {
        let batch = CompetitorBatch {
            insights: vec![
                CompetitorInsight {
                    name: "a".to_string(),
                    url: "https://a.example".to_string(),
                    summary: "ok".to_string(),
                    strengths: vec![],
                    weaknesses: vec![],
                    positioning: String::new(),
                    error: false,
                },
                CompetitorInsight {
                    name: "b".to_string(),
                    url: "https://b.example".to_string(),
                    summary: String::new(),
                    strengths: vec![],
                    weaknesses: vec![],
                    positioning: String::new(),
                    error: true,
                },
            ],
            usage: TokenUsage::default(),
        };

        assert_eq!(batch.usable(), 1);
    }
}
