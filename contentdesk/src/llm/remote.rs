use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{LlmProvider, LlmRequest, LlmResponse, Summary, UsageMetadata};
use common::RemoteLlmConfig;

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Remote LLM provider using OpenAI-compatible HTTP API
pub struct RemoteLlmProvider {
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_max_tokens: usize,
    default_temperature: f32,
    client: reqwest::Client,
}

impl RemoteLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 500,
            default_temperature: 0.3,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(
        mut self,
        timeout_secs: u64,
        max_tokens: usize,
        temperature: f32,
    ) -> Self {
        self.default_timeout = Duration::from_secs(timeout_secs);
        self.default_max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }

    /// Build a provider from an endpoint section, reading the API key from the
    /// environment variable it names.
    pub fn from_config(config: &RemoteLlmConfig) -> Result<Self> {
        let api_key_env = config.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env)
            .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

        let provider = Self::new(
            config.api_url.clone().unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )
        .with_defaults(
            config.timeout_seconds.unwrap_or(30),
            config.max_tokens.unwrap_or(500),
            config.temperature.unwrap_or(0.3),
        );
        Ok(provider)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST a JSON body with bearer auth, failing on timeout or non-2xx status.
    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
        what: &str,
    ) -> Result<String> {
        let response = tokio::time::timeout(
            timeout,
            self.client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send(),
        )
        .await
        .with_context(|| format!("{} request timed out", what))?
        .with_context(|| format!("{} HTTP request failed", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error {}: {} (URL: {})", what, status, body, url);
        }

        tokio::time::timeout(timeout, response.text())
            .await
            .with_context(|| format!("{} response timed out", what))?
            .with_context(|| format!("Failed to read {} response body", what))
    }
}

fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).with_context(|| format!("Failed to parse {} response: {}", what, body))
}

/// Derive the embeddings endpoint from a chat completions URL.
///
/// `http://host/v1/chat/completions` becomes `http://host/v1/embeddings`; a
/// bare `/v1` root gets `/embeddings` appended.
pub fn embeddings_url(base_url: &str) -> String {
    if base_url.ends_with("/embeddings") {
        base_url.to_string()
    } else if base_url.ends_with("/chat/completions") {
        base_url.replace("/chat/completions", "/embeddings")
    } else if base_url.ends_with("/completions") {
        base_url.replace("/completions", "/embeddings")
    } else {
        format!("{}/embeddings", base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl LlmProvider for RemoteLlmProvider {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let timeout = request
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let req_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
            max_tokens: Some(request.max_tokens.unwrap_or(self.default_max_tokens)),
            temperature: Some(request.temperature.unwrap_or(self.default_temperature)),
        };

        let body = self.post_json(&self.base_url, &req_body, timeout, "LLM").await?;
        let resp_body: ChatResponse = parse_body(&body, "LLM")?;

        let choice = resp_body
            .choices
            .first()
            .context("LLM response has no choices")?;

        let usage = resp_body.usage.map(UsageMetadata::from).unwrap_or_default();
        debug!(model = %self.model, total_tokens = usage.total_tokens, "LLM completion received");

        Ok(LlmResponse {
            content: choice.message.content.clone(),
            usage,
            model: resp_body.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn summarize(&self, content: &str, max_tokens: usize) -> Result<Summary> {
        let prompt = format!(
            r#"You are a content summarizer. Create a clear, concise summary that keeps the original meaning.

IMPORTANT INSTRUCTIONS:
1. Write the summary in THE SAME LANGUAGE as the content (Bengali content gets a Bengali summary, English content an English one)
2. IGNORE markdown formatting (###, **, __, etc.) - extract only text content
3. Summarize the key points of the ENTIRE content, not just the first lines

OUTPUT FORMAT (strict JSON):
{{
  "headline": "one-line summary (max 100 chars)",
  "bullets": ["key point 1", "key point 2", "key point 3"],
  "details": "optional additional context"
}}

Use 3-7 bullet points.

CONTENT:
{}
"#,
            content
        );

        let request = LlmRequest {
            prompt,
            max_tokens: Some(max_tokens),
            temperature: Some(0.3),
            timeout_seconds: None,
        };

        let response = self.generate(request).await?;

        let cleaned_json = super::extract_json_from_text(&response.content)
            .context("No valid JSON found in LLM summary response")?;

        let summary_data: SummaryJson = serde_json::from_str(&cleaned_json)
            .with_context(|| format!("Failed to parse LLM summary as JSON. Input was: {}", cleaned_json))?;

        Ok(Summary {
            headline: summary_data.headline,
            bullets: summary_data.bullets,
            details: summary_data.details,
            usage: response.usage,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = embeddings_url(&self.base_url);
        let req_body = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
        };

        let body = self
            .post_json(&url, &req_body, self.default_timeout, "Embedding")
            .await?;

        // Standard OpenAI shape first, then the bare shapes some local servers return
        if let Ok(resp_body) = serde_json::from_str::<EmbeddingResponse>(&body) {
            return resp_body
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .with_context(|| format!("Embedding response has no data: {}", body));
        }
        if let Ok(raw_vec) = serde_json::from_str::<Vec<f32>>(&body) {
            return Ok(raw_vec);
        }
        let single: SingleEmbedding = parse_body(&body, "Embedding")?;
        Ok(single.embedding)
    }
}

// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

impl From<Usage> for UsageMetadata {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
            total_tokens: usage.total_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryJson {
    headline: String,
    #[serde(default)]
    bullets: Vec<String>,
    details: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct SingleEmbedding {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_url_from_chat_endpoint() {
        assert_eq!(
            embeddings_url("http://localhost:11434/v1/chat/completions"),
            "http://localhost:11434/v1/embeddings"
        );
        assert_eq!(
            embeddings_url("http://localhost:11434/v1/completions"),
            "http://localhost:11434/v1/embeddings"
        );
        assert_eq!(embeddings_url("http://host/v1/"), "http://host/v1/embeddings");
        assert_eq!(
            embeddings_url("http://host/v1/embeddings"),
            "http://host/v1/embeddings"
        );
    }

    #[test]
    fn from_config_requires_api_key_env() {
        let config = RemoteLlmConfig {
            api_key_env: Some("CONTENTDESK_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..Default::default()
        };
        let err = RemoteLlmProvider::from_config(&config).err().expect("missing key");
        assert!(err.to_string().contains("CONTENTDESK_TEST_KEY_THAT_IS_NOT_SET"));
    }
}
