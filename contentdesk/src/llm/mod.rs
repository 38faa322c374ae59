use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Core trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion for a given prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Generate a structured summary of `content`, written in the content's own language
    async fn summarize(&self, content: &str, max_tokens: usize) -> Result<Summary>;

    /// Generate vector embedding for text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

impl LlmRequest {
    /// Request with provider defaults for everything but the prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
            timeout_seconds: None,
        }
    }
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Summary structure returned by providers and the extractive fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// One-line headline summary
    pub headline: String,
    /// 3-7 key bullet points
    pub bullets: Vec<String>,
    /// Optional expanded context/details
    pub details: Option<String>,
    /// Usage metadata for tracking
    #[serde(skip)]
    pub usage: UsageMetadata,
}

impl Summary {
    /// Markdown rendering used by the CLI and news reports
    pub fn to_markdown(&self) -> String {
        let mut out = format!("**{}**\n", self.headline);
        for bullet in &self.bullets {
            out.push_str(&format!("- {}\n", bullet));
        }
        if let Some(details) = self.details.as_deref().filter(|d| !d.trim().is_empty()) {
            out.push('\n');
            out.push_str(details.trim());
            out.push('\n');
        }
        out
    }
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

pub mod remote;
pub mod summarizer;

/// Stand-in used when no LLM is configured (adapter `none`).
///
/// Every call fails, so callers take their non-LLM fallbacks.
pub struct OfflineProvider;

#[async_trait::async_trait]
impl LlmProvider for OfflineProvider {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
        anyhow::bail!("no LLM provider configured")
    }

    async fn summarize(&self, _content: &str, _max_tokens: usize) -> Result<Summary> {
        anyhow::bail!("no LLM provider configured")
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("no embedding provider configured")
    }
}

/// Helper to extract JSON from text that might contain markdown backticks or preamble
pub fn extract_json_from_text(text: &str) -> Option<String> {
    // 1. Try to find content between ```json and ```
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 2. Try to find content between ``` and ```
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 3. Try to find the first '{' and last '}'
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Some(text[start..=end].to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Sure! Here it is:\n```json\n{\"headline\": \"x\"}\n```\nAnything else?";
        assert_eq!(extract_json_from_text(text).as_deref(), Some("{\"headline\": \"x\"}"));
    }

    #[test]
    fn extracts_bare_braces() {
        let text = "Summary follows {\"a\": 1} done";
        assert_eq!(extract_json_from_text(text).as_deref(), Some("{\"a\": 1}"));
        assert!(extract_json_from_text("no json } here {").is_none());
    }

    #[test]
    fn summary_markdown_skips_blank_details() {
        let summary = Summary {
            headline: "Rust 2.0".to_string(),
            bullets: vec!["fast".to_string(), "safe".to_string()],
            details: Some("  ".to_string()),
            usage: UsageMetadata::default(),
        };
        assert_eq!(summary.to_markdown(), "**Rust 2.0**\n- fast\n- safe\n");
    }
}
