//! Analysis options submitted with a job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// How thorough the analysis should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    /// Short, objective overview
    Quick,
    /// Balanced level of detail
    #[default]
    Standard,
    /// In-depth analysis
    Detailed,
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Detailed => "detailed",
        }
    }
}

/// Analysis toggles. Immutable once a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Analysis depth
    pub analysis_depth: AnalysisDepth,
    /// Include key moments with timestamps
    pub include_timestamps: bool,
    /// Output language tag, e.g. `en-US`
    pub language: String,
    /// Extract people, objects, locations and brands
    pub extract_entities: bool,
    /// Detect overall sentiment/tone
    pub detect_sentiment: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            analysis_depth: AnalysisDepth::Standard,
            include_timestamps: true,
            language: "en-US".to_string(),
            extract_entities: false,
            detect_sentiment: false,
        }
    }
}

impl AnalysisOptions {
    /// Validate the options.
    pub fn validate(&self) -> Result<(), InputError> {
        if !is_language_tag(&self.language) {
            return Err(InputError::InvalidLanguage(self.language.clone()));
        }
        Ok(())
    }
}

/// Matches `xx-YY`: two lowercase letters, a hyphen, two uppercase letters.
pub fn is_language_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    bytes.len() == 5
        && bytes[0].is_ascii_lowercase()
        && bytes[1].is_ascii_lowercase()
        && bytes[2] == b'-'
        && bytes[3].is_ascii_uppercase()
        && bytes[4].is_ascii_uppercase()
}
