//! Prompt-injection sanitizer for scraped page content
//!
//! Scraped text is untrusted input that ends up inside LLM prompts. This
//! module scans extracted text line by line against known injection
//! signatures and drops any matching line entirely before the text is
//! retained. Anomalies are logged as per-category counts, never content.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Which extracted field a piece of text belongs to.
///
/// Each field carries its own retention cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentField {
    Headline,
    Subheadline,
    PricingTable,
    FaqBlock,
    RawText,
}

impl ContentField {
    /// Maximum retained length in characters
    pub fn max_len(&self) -> usize {
        match self {
            ContentField::Headline => 600,
            ContentField::Subheadline => 600,
            ContentField::PricingTable => 2000,
            ContentField::FaqBlock => 800,
            ContentField::RawText => 4000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentField::Headline => "headline",
            ContentField::Subheadline => "subheadline",
            ContentField::PricingTable => "pricing_table",
            ContentField::FaqBlock => "faq_block",
            ContentField::RawText => "raw_text",
        }
    }
}

/// Injection signature categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureCategory {
    InstructionOverride,
    SystemPromptReference,
    IdentityOverride,
    ControlToken,
    CredentialExfiltration,
}

impl SignatureCategory {
    fn as_str(&self) -> &'static str {
        match self {
            SignatureCategory::InstructionOverride => "instruction_override",
            SignatureCategory::SystemPromptReference => "system_prompt_reference",
            SignatureCategory::IdentityOverride => "identity_override",
            SignatureCategory::ControlToken => "control_token",
            SignatureCategory::CredentialExfiltration => "credential_exfiltration",
        }
    }
}

fn signatures() -> &'static [(SignatureCategory, Regex)] {
    static SIGNATURES: OnceLock<Vec<(SignatureCategory, Regex)>> = OnceLock::new();
    SIGNATURES.get_or_init(|| {
        vec![
            (
                SignatureCategory::InstructionOverride,
                Regex::new(
                    r"(?i)(ignore\s+(all\s+|any\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?|directions?)|disregard\s+(the\s+|all\s+|your\s+)?(previous|prior|earlier|above)|forget\s+(everything|all\s+previous|your\s+(instructions?|rules?))|new\s+instructions?\s*:)",
                )
                .expect("invalid instruction-override regex"),
            ),
            (
                SignatureCategory::SystemPromptReference,
                Regex::new(
                    r"(?i)(system\s+prompt|\[\s*system\s*\]|<\s*system\s*>|developer\s+message|hidden\s+prompt|initial\s+prompt)",
                )
                .expect("invalid system-prompt regex"),
            ),
            (
                SignatureCategory::IdentityOverride,
                Regex::new(
                    r"(?i)(you\s+are\s+(now|no\s+longer)|act\s+as\s+(if\s+you|an?\s)|pretend\s+(to\s+be|you\s+are)|roleplay\s+as|from\s+now\s+on\s+you)",
                )
                .expect("invalid identity-override regex"),
            ),
            (
                SignatureCategory::ControlToken,
                Regex::new(
                    r"(<\|im_start\|>|<\|im_end\|>|<\|endoftext\|>|\[INST\]|\[/INST\]|<<SYS>>|<</SYS>>)",
                )
                .expect("invalid control-token regex"),
            ),
            (
                SignatureCategory::CredentialExfiltration,
                Regex::new(
                    r"(?i)((reveal|print|show|output|leak|send|exfiltrate)\b.{0,50}\b(api\s*key|secret|credential|token|password)|\b(api\s*key|secret|password)s?\s+(are|is|:))",
                )
                .expect("invalid credential-exfiltration regex"),
            ),
        ]
    })
}

/// Sanitize extracted text before it is retained.
///
/// Lines matching any injection signature are removed outright (not
/// redacted in place). Surviving lines are whitespace-normalized and the
/// result is truncated to the field's cap on a char boundary.
pub fn sanitize(text: &str, field: ContentField) -> String {
    let mut category_counts = [0usize; 5];
    let mut kept: Vec<String> = Vec::new();

    for line in text.lines() {
        let mut dropped = false;
        for (idx, (_category, regex)) in signatures().iter().enumerate() {
            if regex.is_match(line) {
                category_counts[idx] += 1;
                dropped = true;
                break;
            }
        }

        if dropped {
            continue;
        }

        let normalized = normalize_whitespace(line);
        if !normalized.is_empty() {
            kept.push(normalized);
        }
    }

    let total_dropped: usize = category_counts.iter().sum();
    if total_dropped > 0 {
        let breakdown: Vec<String> = signatures()
            .iter()
            .enumerate()
            .filter(|(idx, _)| category_counts[*idx] > 0)
            .map(|(idx, (category, _))| format!("{}={}", category.as_str(), category_counts[idx]))
            .collect();
        warn!(
            "Sanitizer dropped {} line(s) from {} ({})",
            total_dropped,
            field.as_str(),
            breakdown.join(", ")
        );
    }

    truncate_chars(&kept.join("\n"), field.max_len())
}

/// Collapse runs of whitespace to single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
