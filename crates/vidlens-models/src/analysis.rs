//! Analysis result payload stored on completed jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum length of the plain-text summary.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Basic metadata about the analyzed video, taken from the reachability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct VideoMetadata {
    /// Container format from the URL extension (e.g. `mp4`)
    pub format: String,
    /// Size in bytes, when the origin reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Content type reported by the origin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Structured metadata about the analysis itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct AnalysisMetadata {
    /// Language the analysis was requested in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Topics/categories
    #[serde(default)]
    pub topics: Vec<String>,
}

/// The analysis produced by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Analysis {
    /// Full analysis in Markdown
    pub markdown: String,
    /// Short plain-text summary
    pub summary: String,
    /// Analysis metadata
    pub metadata: AnalysisMetadata,
}

impl Analysis {
    /// Build an analysis from the provider's markdown, deriving the summary.
    pub fn from_markdown(markdown: impl Into<String>, language: Option<String>) -> Self {
        let markdown = markdown.into();
        let summary = summarize(&markdown);
        Self {
            markdown,
            summary,
            metadata: AnalysisMetadata {
                language,
                topics: Vec::new(),
            },
        }
    }
}

/// Provider metadata for a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AiProviderInfo {
    /// Provider name
    pub provider: String,
    /// Model that produced the analysis
    pub model: String,
    /// Total tokens reported by the provider
    pub tokens_used: u64,
    /// Wall-clock latency of the successful call, including retries
    pub processing_time_ms: u64,
}

/// Full result stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub video_metadata: VideoMetadata,
    pub analysis: Analysis,
    pub ai_provider: AiProviderInfo,
}

/// First three non-empty lines joined, stripped of heading markers, capped
/// at [`SUMMARY_MAX_CHARS`] characters.
pub fn summarize(markdown: &str) -> String {
    let joined = markdown
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .filter(|l| !l.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(" ");

    joined.chars().take(SUMMARY_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_takes_first_lines() {
        let md = "# Title\n\n## Summary\n\nA tutorial about Rust.\n\nMore text here.";
        assert_eq!(summarize(md), "Title Summary A tutorial about Rust.");
    }

    #[test]
    fn test_summarize_truncates_on_char_boundary() {
        let md = "é".repeat(SUMMARY_MAX_CHARS + 10);
        let summary = summarize(&md);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS);
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize("\n\n"), "");
    }
}
