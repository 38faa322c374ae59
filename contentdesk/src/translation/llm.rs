use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Language, TranslationBackend};
use crate::llm::{LlmProvider, LlmRequest};

/// Translation backend that prompts a chat model.
pub struct LlmTranslationBackend {
    provider: Arc<dyn LlmProvider>,
}

impl LlmTranslationBackend {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl TranslationBackend for LlmTranslationBackend {
    async fn translate(&self, text: &str, _source: &str, target: Language) -> Result<String> {
        let prompt = format!(
            "Translate the following text to {}. Keep the meaning, tone and formatting.\n\
             Reply with the translation only, without notes or quotes.\n\nText:\n{}",
            target.name(),
            text
        );

        let response = self
            .provider
            .generate(LlmRequest {
                prompt,
                max_tokens: Some(4096),
                temperature: Some(0.2),
                timeout_seconds: None,
            })
            .await
            .context("LLM translation failed")?;

        let translated = response.content.trim();
        anyhow::ensure!(!translated.is_empty(), "LLM returned an empty translation");
        Ok(translated.to_string())
    }
}

/// Output of the refinement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinedTranslation {
    /// Text of the `Initial Translations:` section when the model produced one
    pub initial: Option<String>,
    pub refined: String,
}

/// Ask the model to polish a raw machine translation so it reads naturally.
///
/// Bengali gets stricter instructions and a two-section reply
/// (`Initial Translations:` / `Refined Translation:`), which is parsed back.
pub async fn refine_translation(
    provider: &dyn LlmProvider,
    original: &str,
    translated_chunks: &[String],
    target: Language,
) -> Result<RefinedTranslation> {
    let mut chunk_text = String::new();
    for (i, chunk) in translated_chunks.iter().enumerate() {
        chunk_text.push_str(&format!("Chunk {}:\n{}\n\n", i + 1, chunk));
    }

    let mut prompt = format!(
        "You are a professional translator. Below is a text and its machine translation to {}, \
         split into {} chunks.\nRefine the translation so it is accurate, natural and culturally \
         appropriate, then combine the chunks into one coherent text.\n\n\
         Original text:\n{}\n\nMachine translation:\n{}",
        target.name(),
        translated_chunks.len(),
        original,
        chunk_text
    );

    if target == Language::Bn {
        prompt.push_str(
            "For Bengali:\n\
             - Make the text natural and well-mannered\n\
             - Use proper Bengali grammar, sentence structure and punctuation\n\
             - Keep a formal tone where appropriate\n\n\
             Format your response exactly as follows:\n\
             Initial Translations:\n[the machine translation, chunk by chunk]\n\n\
             Refined Translation:\n[your refined and combined version]",
        );
    } else {
        prompt.push_str("Reply with the refined translation only.");
    }

    let response = provider
        .generate(LlmRequest {
            prompt,
            max_tokens: Some(4096),
            temperature: Some(0.3),
            timeout_seconds: None,
        })
        .await
        .context("LLM refinement failed")?;

    let refined = parse_refinement(&response.content);
    anyhow::ensure!(!refined.refined.is_empty(), "LLM returned an empty refinement");
    info!(lang = %target, chars = refined.refined.chars().count(), "translation refined");
    Ok(refined)
}

fn parse_refinement(reply: &str) -> RefinedTranslation {
    const INITIAL: &str = "Initial Translations:";
    const REFINED: &str = "Refined Translation:";

    match (reply.find(INITIAL), reply.find(REFINED)) {
        (Some(i), Some(r)) if i < r => RefinedTranslation {
            initial: Some(reply[i + INITIAL.len()..r].trim().to_string()),
            refined: reply[r + REFINED.len()..].trim().to_string(),
        },
        (_, Some(r)) => RefinedTranslation {
            initial: None,
            refined: reply[r + REFINED.len()..].trim().to_string(),
        },
        _ => {
            if reply.contains(INITIAL) {
                warn!("refinement reply has no refined section, using it whole");
            }
            RefinedTranslation {
                initial: None,
                refined: reply.trim().to_string(),
            }
        }
    }
}
