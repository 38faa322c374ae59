//! Translation memoization over a pluggable backend.
//!
//! [`TranslationCache`] is a plain owned value. Share it between tasks by
//! wrapping it in a `tokio::sync::Mutex`, as [`crate::assistant::Assistant`] does.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::text::split_into_chunks;

pub mod google;
pub mod llm;

/// Payload limit of the public translate endpoint, in characters.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 5000;

/// Languages the assistant accepts as translation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
    Fr,
    De,
    It,
    Pt,
    Ru,
    Zh,
    Ja,
    Ko,
    Bn,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::En,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::It,
        Language::Pt,
        Language::Ru,
        Language::Zh,
        Language::Ja,
        Language::Ko,
        Language::Bn,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::It => "it",
            Language::Pt => "pt",
            Language::Ru => "ru",
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::Ko => "ko",
            Language::Bn => "bn",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish",
            Language::Fr => "French",
            Language::De => "German",
            Language::It => "Italian",
            Language::Pt => "Portuguese",
            Language::Ru => "Russian",
            Language::Zh => "Chinese",
            Language::Ja => "Japanese",
            Language::Ko => "Korean",
            Language::Bn => "Bengali",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguageError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == code)
            .ok_or_else(|| UnsupportedLanguageError {
                code: code.to_string(),
            })
    }
}

fn supported_codes() -> String {
    Language::ALL
        .iter()
        .map(|l| l.code())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The requested target language is not in [`Language::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language '{code}' (supported languages: {})", supported_codes())]
pub struct UnsupportedLanguageError {
    pub code: String,
}

/// Text-in/text-out translation service.
#[async_trait::async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Translate `text` from `source` (`"auto"` for detection) into `target`.
    async fn translate(&self, text: &str, source: &str, target: Language) -> Result<String>;
}

/// Where a [`Translation`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationOrigin {
    /// Translated by the backend during this call
    Backend,
    /// Served from the cache
    Cache,
    /// Returned untouched (blank input, or already in the target language)
    Unchanged,
}

/// Result of translating one backend segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    Translated,
    /// The backend failed; the segment's original text was kept
    Fallback { error: String },
}

/// A best-effort translation with a per-segment success record.
#[derive(Debug, Clone)]
pub struct Translation {
    pub text: String,
    pub origin: TranslationOrigin,
    /// Populated for [`TranslationOrigin::Backend`] only
    pub segments: Vec<SegmentOutcome>,
}

impl Translation {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            origin: TranslationOrigin::Unchanged,
            segments: Vec::new(),
        }
    }

    /// True when at least one segment kept its untranslated text.
    pub fn is_degraded(&self) -> bool {
        self.fallback_count() > 0
    }

    pub fn fallback_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, SegmentOutcome::Fallback { .. }))
            .count()
    }
}

/// Memoizes translations keyed by the exact `(text, target language)` pair.
///
/// Entries live until [`TranslationCache::clear`]; there is no partial eviction.
/// Degraded results are returned but not stored, so the next call retries.
pub struct TranslationCache {
    backend: Arc<dyn TranslationBackend>,
    entries: HashMap<(String, Language), String>,
    max_segment_chars: usize,
}

impl TranslationCache {
    pub fn new(backend: Arc<dyn TranslationBackend>) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }

    pub fn with_max_segment_chars(mut self, max_segment_chars: usize) -> Self {
        self.max_segment_chars = max_segment_chars.max(1);
        self
    }

    /// Translate `text` into `target_language`, consulting the cache first.
    ///
    /// Only an unknown language code is an error. Backend failures degrade
    /// the affected segments to their original text.
    pub async fn translate(
        &mut self,
        text: &str,
        target_language: &str,
    ) -> Result<Translation, UnsupportedLanguageError> {
        let target: Language = target_language.parse()?;

        if text.trim().is_empty() {
            return Ok(Translation::unchanged(text));
        }

        // ASCII-only text is assumed to be English already. Approximate: it
        // says nothing about other Latin-script languages.
        if target == Language::En && text.is_ascii() {
            debug!("text is ASCII, skipping translation to English");
            return Ok(Translation::unchanged(text));
        }

        let key = (text.to_string(), target);
        if let Some(cached) = self.entries.get(&key) {
            debug!(lang = %target, chars = text.len(), "translation cache hit");
            return Ok(Translation {
                text: cached.clone(),
                origin: TranslationOrigin::Cache,
                segments: Vec::new(),
            });
        }

        let segments = backend_segments(text, self.max_segment_chars);
        let mut translated = Vec::with_capacity(segments.len());
        let mut outcomes = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            match self.backend.translate(segment, "auto", target).await {
                Ok(out) => {
                    translated.push(out);
                    outcomes.push(SegmentOutcome::Translated);
                }
                Err(e) => {
                    warn!(segment = index, lang = %target, "Error translating segment, keeping original: {:#}", e);
                    translated.push(segment.clone());
                    outcomes.push(SegmentOutcome::Fallback {
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        let result = Translation {
            text: translated.join(" "),
            origin: TranslationOrigin::Backend,
            segments: outcomes,
        };

        if result.is_degraded() {
            info!(
                lang = %target,
                failed = result.fallback_count(),
                total = result.segments.len(),
                "translation degraded, not caching"
            );
        } else {
            self.entries.insert(key, result.text.clone());
        }

        Ok(result)
    }

    /// Evict every cached entry.
    pub fn clear(&mut self) {
        info!(entries = self.entries.len(), "clearing translation cache");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, text: &str, target: Language) -> bool {
        self.entries.contains_key(&(text.to_string(), target))
    }
}

/// Cut text into pieces the backend accepts. Text within the limit is sent
/// as-is; longer text gets sentence/word packing, then a hard character split
/// for any single word still over the limit.
pub fn backend_segments(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }
    split_into_chunks(text, max_chars)
        .into_iter()
        .flat_map(|chunk| {
            if chunk.chars().count() <= max_chars {
                vec![chunk]
            } else {
                let chars: Vec<char> = chunk.chars().collect();
                chars
                    .chunks(max_chars)
                    .map(|piece| piece.iter().collect::<String>())
                    .collect()
            }
        })
        .collect()
}
