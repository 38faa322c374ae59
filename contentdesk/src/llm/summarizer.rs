// Summaries and headlines with extractive fallbacks
use tracing::{info, warn};

use super::{LlmProvider, LlmRequest, Summary, UsageMetadata};
use crate::text::split_sentences;

/// Generate a summary, falling back to an extractive one when the LLM fails
pub async fn summarize_content<P: LlmProvider + ?Sized>(
    provider: &P,
    content: &str,
    max_tokens: usize,
) -> Summary {
    match provider.summarize(content, max_tokens).await {
        Ok(summary) => {
            info!(
                "LLM summarization successful: {} bullets, {} tokens",
                summary.bullets.len(),
                summary.usage.total_tokens
            );
            summary
        }
        Err(e) => {
            warn!("LLM summarization failed: {}, falling back to extractive summary", e);
            extractive_summary(content)
        }
    }
}

/// Generate a 5-10 word headline in the language of `content`.
///
/// Falls back to the first sentence cut to ten words when the LLM fails or
/// returns nothing usable.
pub async fn generate_headline<P: LlmProvider + ?Sized>(provider: &P, content: &str) -> String {
    let request = LlmRequest {
        prompt: headline_prompt(content),
        max_tokens: Some(60),
        temperature: Some(0.3),
        timeout_seconds: None,
    };

    match provider.generate(request).await {
        Ok(response) => {
            let headline = clean_headline(&response.content);
            if headline.is_empty() {
                warn!("LLM returned an empty headline, using first sentence");
                fallback_headline(content)
            } else {
                headline
            }
        }
        Err(e) => {
            warn!("LLM headline generation failed: {}, using first sentence", e);
            fallback_headline(content)
        }
    }
}

/// Rough script check: anything outside ASCII is treated as non-English.
pub fn is_probably_non_english(text: &str) -> bool {
    !text.is_ascii()
}

fn headline_prompt(content: &str) -> String {
    let mut prompt = format!(
        "Create a short, impactful headline (5-10 words) for the following content.\n\
         The headline must be in the same language as the content.\n\
         Focus on the main topic and key message. Make it engaging.\n\
         Reply with the headline only.\n\nContent:\n{}",
        content
    );

    if is_probably_non_english(content) {
        prompt.push_str(
            "\n\nIf the content is in Bengali:\n\
             1. Write the headline in Bengali\n\
             2. Use proper Bengali grammar and sentence structure\n\
             3. Use natural Bengali expressions and punctuation",
        );
    }

    prompt
}

/// First non-empty line with surrounding quotes, markdown markers and a `Headline:` label removed.
fn clean_headline(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let line = line.trim_start_matches('#').trim();
    let line = line
        .strip_prefix("Headline:")
        .or_else(|| line.strip_prefix("headline:"))
        .unwrap_or(line)
        .trim();
    line.trim_matches(|c: char| c == '"' || c == '*' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}

fn fallback_headline(content: &str) -> String {
    split_sentences(content)
        .first()
        .map(|s| s.split_whitespace().take(10).collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| "No content".to_string())
}

/// Fallback extractive summary when LLM fails
fn extractive_summary(text: &str) -> Summary {
    let sentences = split_sentences(text);

    let headline = sentences
        .first()
        .map(|s| truncate(s, 100))
        .unwrap_or_else(|| "No content".to_string());

    let bullets = sentences
        .iter()
        .skip(1)
        .take(5)
        .map(|s| truncate(s, 200))
        .collect();

    Summary {
        headline,
        bullets,
        details: Some(text.chars().take(1000).collect()),
        usage: UsageMetadata::default(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use anyhow::Result;

    struct FailingProvider;

    #[async_trait::async_trait]
    impl LlmProvider for FailingProvider {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
            anyhow::bail!("offline")
        }
        async fn summarize(&self, _content: &str, _max_tokens: usize) -> Result<Summary> {
            anyhow::bail!("offline")
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("offline")
        }
    }

    struct EchoProvider(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for EchoProvider {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.0.to_string(),
                usage: UsageMetadata::default(),
                model: "echo".to_string(),
            })
        }
        async fn summarize(&self, _content: &str, _max_tokens: usize) -> Result<Summary> {
            anyhow::bail!("not used")
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("not used")
        }
    }

    #[test]
    fn test_extractive_summary() {
        let text = "First sentence is the headline. Second sentence is a bullet. \
                    Third sentence is another bullet. Fourth is yet another. \
                    Fifth sentence here. Sixth and final. Seventh is dropped.";

        let summary = extractive_summary(text);

        assert_eq!(summary.headline, "First sentence is the headline.");
        assert_eq!(summary.bullets.len(), 5);
        assert_eq!(summary.bullets[0], "Second sentence is a bullet.");
        assert!(summary.details.is_some());
    }

    #[test]
    fn test_extractive_summary_truncation() {
        let long_sentence = "আ".repeat(150);
        let text = format!("{}. Second sentence.", long_sentence);

        let summary = extractive_summary(&text);

        assert_eq!(summary.headline.chars().count(), 100);
        assert!(summary.headline.ends_with("..."));
    }

    #[tokio::test]
    async fn summarize_falls_back_when_provider_fails() {
        let summary = summarize_content(&FailingProvider, "Only one sentence here.", 200).await;
        assert_eq!(summary.headline, "Only one sentence here.");
        assert!(summary.bullets.is_empty());
    }

    #[tokio::test]
    async fn headline_is_cleaned() {
        let provider = EchoProvider("\n## Headline: \"Rust Takes Over the Datacenter\"\nextra");
        let headline = generate_headline(&provider, "Some content.").await;
        assert_eq!(headline, "Rust Takes Over the Datacenter");
    }

    #[tokio::test]
    async fn headline_falls_back_to_first_sentence() {
        let content = "one two three four five six seven eight nine ten eleven twelve. Second.";
        let headline = generate_headline(&FailingProvider, content).await;
        assert_eq!(headline, "one two three four five six seven eight nine ten");

        let headline = generate_headline(&EchoProvider("   "), "Short. Text.").await;
        assert_eq!(headline, "Short.");
    }

    #[test]
    fn bengali_guidance_only_for_non_ascii() {
        assert!(headline_prompt("আমার সোনার বাংলা").contains("Bengali"));
        assert!(!headline_prompt("plain english").contains("Bengali"));
    }
}
