//! Prompt modules for report generation
//!
//! Six independent modules, each a pure request builder plus a strict
//! output schema. Prompt construction is deterministic for identical
//! inputs; the model call is the only non-deterministic step. A response
//! that fails schema validation is a recoverable stage failure.

use crate::analyzer::{display_name, CompetitorInsight};
use crate::extractor::{ExtractedPageContent, SiteContent};
use crate::llm::ModuleRequest;
use crate::report::ReportProfile;
use crate::sanitizer::truncate_chars;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

// ============================================================================
// Output schemas
// ============================================================================

/// Effort bucket attached to a gap by the gap-analysis module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffortEstimate {
    Low,
    Medium,
    High,
}

impl EffortEstimate {
    /// Penalty applied when ranking issues (higher effort ranks lower)
    pub fn penalty(&self) -> i32 {
        match self {
            EffortEstimate::Low => 0,
            EffortEstimate::Medium => 15,
            EffortEstimate::High => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffortEstimate::Low => "low",
            EffortEstimate::Medium => "medium",
            EffortEstimate::High => "high",
        }
    }
}

/// A single conversion gap with its impact and effort estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GapItem {
    pub issue: String,
    /// Estimated conversion impact, 0-100
    pub impact_score: u8,
    pub effort: EffortEstimate,
}

/// Per-competitor messaging overlap percentage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlapItem {
    pub competitor: String,
    /// 0-100: how much of the company's messaging this competitor also claims
    pub overlap_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GapAnalysisOutput {
    pub gaps: Vec<GapItem>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub messaging_overlap: Vec<OverlapItem>,
    pub missing_objections: Vec<String>,
    pub differentiation_gaps: Vec<String>,
    pub pricing_clarity_issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeroRewrite {
    pub headline: String,
    pub subheadline: String,
    pub primary_cta: String,
    #[serde(default)]
    pub secondary_cta: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingRewrite {
    pub value_metric: String,
    pub anchor: String,
    pub packaging_notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectionResponse {
    pub objection: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectionPlan {
    pub objections: Vec<ObjectionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DifferentiationClaim {
    pub claim: String,
    pub proof: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DifferentiationPlan {
    pub differentiators: Vec<DifferentiationClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompetitorCounter {
    pub competitor: String,
    pub counter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterPositioning {
    pub counters: Vec<CompetitorCounter>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a module response into its typed output.
///
/// A parse failure is a schema-validation error, which the worker treats
/// as a retryable stage failure.
pub fn parse_module_output<T: DeserializeOwned>(module: &'static str, content: &str) -> Result<T> {
    let json = extract_json(content);
    serde_json::from_str(&json).map_err(|e| ReportError::SchemaValidation {
        module: module.to_string(),
        message: e.to_string(),
    })
}

/// Extract JSON from a response that might contain markdown code blocks
pub fn extract_json(response: &str) -> String {
    // Try to find JSON in code blocks first
    if let Some(start) = response.find("```json") {
        let after_marker = &response[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return after_marker[..end].trim().to_string();
        }
    }

    // Try generic code block
    if let Some(start) = response.find("```") {
        let after_marker = &response[start + 3..];
        let content_start = after_marker.find('\n').map(|i| i + 1).unwrap_or(0);
        let after_newline = &after_marker[content_start..];
        if let Some(end) = after_newline.find("```") {
            return after_newline[..end].trim().to_string();
        }
    }

    // Try to find raw JSON object
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            return response[start..=end].to_string();
        }
    }

    response.to_string()
}

// ============================================================================
// Shared prompt context
// ============================================================================

fn site_context(profile: &ReportProfile, content: &SiteContent) -> String {
    let homepage = &content.homepage;
    let pricing_section = match &content.pricing {
        Some(pricing) => format!(
            "## Pricing Page\n\nHeadline: {}\nPricing tables:\n{}\n",
            pricing.headline.as_deref().unwrap_or("N/A"),
            pricing
                .pricing_table_text
                .as_deref()
                .or(homepage.pricing_table_text.as_deref())
                .unwrap_or("N/A"),
        ),
        None => format!(
            "## Pricing\n\nPricing tables found on the homepage:\n{}\n",
            homepage.pricing_table_text.as_deref().unwrap_or("N/A"),
        ),
    };

    let faq_section = if homepage.faq_blocks.is_empty() {
        String::new()
    } else {
        format!("## FAQ Content\n\n{}\n", homepage.faq_blocks.join("\n---\n"))
    };

    format!(
        r#"## Company

Name: {company}
Website: {url}
Segment: {segment}

## Homepage

Headline: {headline}
Subheadline: {subheadline}

Page text (truncated):
{raw}

{pricing}
{faq}"#,
        company = profile.company.as_deref().unwrap_or("unknown"),
        url = profile.homepage_url,
        segment = profile.segment.as_deref().unwrap_or("B2B SaaS"),
        headline = homepage.headline.as_deref().unwrap_or("N/A"),
        subheadline = homepage.subheadline.as_deref().unwrap_or("N/A"),
        raw = homepage.raw_text,
        pricing = pricing_section,
        faq = faq_section,
    )
}

fn competitors_context(competitors: &[CompetitorInsight]) -> String {
    let usable: Vec<&CompetitorInsight> = competitors.iter().filter(|c| !c.error).collect();
    if usable.is_empty() {
        return "No competitor insight available.".to_string();
    }
    serde_json::to_string_pretty(&usable).unwrap_or_default()
}

/// Raw competitor page context for gap analysis, which runs before
/// competitor synthesis has produced structured insight
fn competitor_pages_context(pages: &[ExtractedPageContent]) -> String {
    if pages.is_empty() {
        return "No competitor pages available.".to_string();
    }

    pages
        .iter()
        .map(|page| {
            format!(
                "### {name} ({url})\nHeadline: {headline}\nPricing tables:\n{pricing}\nPage text (truncated):\n{raw}",
                name = display_name(&page.url),
                url = page.url,
                headline = page.headline.as_deref().unwrap_or("N/A"),
                pricing = page.pricing_table_text.as_deref().unwrap_or("N/A"),
                raw = truncate_chars(&page.raw_text, 1500),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Module request builders
// ============================================================================

pub const GAP_ANALYSIS_MODULE: &str = "gap_analysis";
pub const HERO_REWRITE_MODULE: &str = "hero_rewrite";
pub const PRICING_REWRITE_MODULE: &str = "pricing_rewrite";
pub const OBJECTION_MODULE: &str = "objection_handling";
pub const DIFFERENTIATION_MODULE: &str = "differentiation";
pub const COUNTER_MODULE: &str = "competitive_counter";

/// Gap analysis: the primary diagnostic module whose output feeds scoring.
///
/// Runs before competitor synthesis, so it sees raw competitor pages
/// rather than structured insight.
pub fn gap_analysis_request(
    profile: &ReportProfile,
    competitor_pages: &[ExtractedPageContent],
    content: &SiteContent,
) -> ModuleRequest {
    let user = format!(
        r#"{site}

## Competitor Pages

{competitors}

---

Identify conversion-messaging gaps on this company's website compared to the
competitor pages above. Score each gap's conversion impact from 0 to 100 and
estimate the effort to fix it. Estimate, per competitor, what percentage of
the company's messaging the competitor also claims (overlap); use the
competitor's hostname as its name.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "gaps": [
    {{"issue": "No social proof above the fold", "impact_score": 70, "effort": "low"}}
  ],
  "opportunities": ["Opportunity description"],
  "risks": ["Risk description"],
  "messaging_overlap": [
    {{"competitor": "acme", "overlap_percent": 40}}
  ],
  "missing_objections": ["Objection the site never addresses"],
  "differentiation_gaps": ["Claim competitors make that this site cannot counter"],
  "pricing_clarity_issues": ["Why the pricing is hard to evaluate"]
}}
```
"#,
        site = site_context(profile, content),
        competitors = competitor_pages_context(competitor_pages),
    );

    ModuleRequest::new(
        GAP_ANALYSIS_MODULE,
        "You are a B2B conversion strategist. You analyze website messaging against competitors and report specific, evidence-based gaps. You respond only with JSON.".to_string(),
        user,
    )
}

/// Hero section rewrite
pub fn hero_rewrite_request(
    profile: &ReportProfile,
    competitors: &[CompetitorInsight],
    content: &SiteContent,
) -> ModuleRequest {
    let user = format!(
        r#"{site}

## Competitors

{competitors}

---

Rewrite the hero section so it communicates differentiated value in the
first five seconds. Keep claims the site can support.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "headline": "New headline",
  "subheadline": "New subheadline",
  "primary_cta": "Primary call to action",
  "secondary_cta": "Optional secondary call to action"
}}
```
"#,
        site = site_context(profile, content),
        competitors = competitors_context(competitors),
    );

    ModuleRequest::new(
        HERO_REWRITE_MODULE,
        "You are a conversion copywriter for B2B SaaS. You write concrete, specific hero copy. You respond only with JSON.".to_string(),
        user,
    )
}

/// Pricing presentation rewrite
pub fn pricing_rewrite_request(
    profile: &ReportProfile,
    competitors: &[CompetitorInsight],
    content: &SiteContent,
) -> ModuleRequest {
    let user = format!(
        r#"{site}

## Competitors

{competitors}

---

Propose a clearer pricing presentation: the value metric buyers should be
anchored on, the anchor statement itself, and packaging notes.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "value_metric": "What the customer pays per",
  "anchor": "The anchoring statement",
  "packaging_notes": ["Note about tiers or packaging"]
}}
```
"#,
        site = site_context(profile, content),
        competitors = competitors_context(competitors),
    );

    ModuleRequest::new(
        PRICING_REWRITE_MODULE,
        "You are a SaaS pricing strategist. You respond only with JSON.".to_string(),
        user,
    )
}

/// Objection handling plan
pub fn objection_request(
    profile: &ReportProfile,
    competitors: &[CompetitorInsight],
    content: &SiteContent,
) -> ModuleRequest {
    let user = format!(
        r#"{site}

## Competitors

{competitors}

---

List the buying objections a prospect in this segment will raise, and write
a direct response to each that this company's website could publish.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "objections": [
    {{"objection": "The objection", "response": "The published response"}}
  ]
}}
```
"#,
        site = site_context(profile, content),
        competitors = competitors_context(competitors),
    );

    ModuleRequest::new(
        OBJECTION_MODULE,
        "You are a B2B sales enablement expert. You respond only with JSON.".to_string(),
        user,
    )
}

/// Differentiation claims with proof
pub fn differentiation_request(
    profile: &ReportProfile,
    competitors: &[CompetitorInsight],
    content: &SiteContent,
) -> ModuleRequest {
    let user = format!(
        r#"{site}

## Competitors

{competitors}

---

Write differentiation claims this company can defensibly make against the
competitors above, each with the proof point that backs it.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "differentiators": [
    {{"claim": "The claim", "proof": "The proof point"}}
  ]
}}
```
"#,
        site = site_context(profile, content),
        competitors = competitors_context(competitors),
    );

    ModuleRequest::new(
        DIFFERENTIATION_MODULE,
        "You are a competitive positioning strategist. You respond only with JSON.".to_string(),
        user,
    )
}

/// Per-competitor counter-positioning
pub fn counter_positioning_request(
    profile: &ReportProfile,
    competitors: &[CompetitorInsight],
    content: &SiteContent,
) -> ModuleRequest {
    let user = format!(
        r#"{site}

## Competitors

{competitors}

---

For each competitor, write one counter-positioning statement this company
can use when buyers compare the two head to head.

Respond with ONLY valid JSON in this exact format:
```json
{{
  "counters": [
    {{"competitor": "acme", "counter": "The counter-positioning statement"}}
  ]
}}
```
"#,
        site = site_context(profile, content),
        competitors = competitors_context(competitors),
    );

    ModuleRequest::new(
        COUNTER_MODULE,
        "You are a competitive positioning strategist. You respond only with JSON.".to_string(),
        user,
    )
}
