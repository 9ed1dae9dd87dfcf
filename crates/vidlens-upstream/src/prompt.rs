//! Prompt construction for video analysis.

use vidlens_models::{AnalysisDepth, AnalysisOptions};

/// System message sent with every analysis request.
pub const SYSTEM_PROMPT: &str = "You are an expert video analyst. \
Provide detailed, well-structured analyses in Markdown. \
Be objective and precise, and organize the content clearly.";

fn depth_instruction(depth: AnalysisDepth) -> &'static str {
    match depth {
        AnalysisDepth::Quick => "Provide a concise and objective analysis.",
        AnalysisDepth::Standard => "Provide a balanced analysis with a good level of detail.",
        AnalysisDepth::Detailed => "Provide a very detailed, in-depth analysis.",
    }
}

/// Build the user prompt from the analysis options.
pub fn build_analysis_prompt(options: &AnalysisOptions) -> String {
    let mut parts = vec![
        format!("Analyze this video and write the analysis in {}.", options.language),
        depth_instruction(options.analysis_depth).to_string(),
        String::new(),
        "Format the analysis as well-structured Markdown, including:".to_string(),
        "- # Main title of the analysis".to_string(),
        "- ## Executive Summary (2-3 paragraphs)".to_string(),
        "- ## Detailed Content Description".to_string(),
        "- ## Visual and Technical Elements".to_string(),
    ];

    if options.include_timestamps {
        parts.push("- ## Key Moments (with timestamps in MM:SS format)".to_string());
    }

    if options.extract_entities {
        parts.push("- ## Identified Entities (people, objects, locations, brands)".to_string());
    }

    if options.detect_sentiment {
        parts.push("- ## Sentiment and Tone Analysis".to_string());
    }

    parts.push("- ## Conclusion".to_string());
    parts.push(String::new());
    parts.push("Be specific and objective, and keep a clear hierarchical structure.".to_string());

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_sections() {
        let prompt = build_analysis_prompt(&AnalysisOptions::default());
        assert!(prompt.starts_with("Analyze this video and write the analysis in en-US."));
        assert!(prompt.contains("balanced analysis"));
        assert!(prompt.contains("Key Moments"));
        assert!(!prompt.contains("Identified Entities"));
        assert!(!prompt.contains("Sentiment"));
        assert!(prompt.contains("## Conclusion"));
    }

    #[test]
    fn test_optional_sections() {
        let options = AnalysisOptions {
            analysis_depth: AnalysisDepth::Detailed,
            include_timestamps: false,
            language: "pt-BR".into(),
            extract_entities: true,
            detect_sentiment: true,
        };
        let prompt = build_analysis_prompt(&options);
        assert!(prompt.contains("in pt-BR"));
        assert!(prompt.contains("in-depth"));
        assert!(!prompt.contains("Key Moments"));
        assert!(prompt.contains("Identified Entities"));
        assert!(prompt.contains("Sentiment and Tone"));
    }
}
