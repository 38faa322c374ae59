use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{Language, TranslationBackend};

pub const DEFAULT_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Backend for Google's public `translate_a/single` endpoint (no API key).
pub struct GoogleTranslateBackend {
    endpoint: String,
    client: Client,
}

impl GoogleTranslateBackend {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

/// Google names simplified Chinese `zh-CN`; every other code is used as-is.
fn google_code(lang: Language) -> &'static str {
    match lang {
        Language::Zh => "zh-CN",
        other => other.code(),
    }
}

/// The response is a nested array; `body[0]` holds one `[translated, original, ...]`
/// entry per sentence the service detected.
fn parse_translation(body: &Value) -> Result<String> {
    let sentences = body
        .get(0)
        .and_then(Value::as_array)
        .context("translate response has no sentence list")?;

    let text: String = sentences
        .iter()
        .filter_map(|entry| entry.get(0).and_then(Value::as_str))
        .collect();

    anyhow::ensure!(!text.is_empty(), "translate response contained no text");
    Ok(text)
}

#[async_trait::async_trait]
impl TranslationBackend for GoogleTranslateBackend {
    async fn translate(&self, text: &str, source: &str, target: Language) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", google_code(target)),
                ("dt", "t"),
            ])
            .form(&[("q", text)])
            .send()
            .await
            .context("translate HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("translate API error {}: {}", status, body);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse translate response")?;
        parse_translation(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_sentence_fragments() {
        let body = json!([
            [
                ["Hola mundo. ", "Hello world. ", null, null, 10],
                ["Adiós.", "Bye.", null, null, 10]
            ],
            null,
            "en"
        ]);
        assert_eq!(parse_translation(&body).unwrap(), "Hola mundo. Adiós.");
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(parse_translation(&json!({"error": "nope"})).is_err());
        assert!(parse_translation(&json!([[]])).is_err());
    }

    #[test]
    fn chinese_uses_region_code() {
        assert_eq!(google_code(Language::Zh), "zh-CN");
        assert_eq!(google_code(Language::Bn), "bn");
    }
}
