//! User-facing workflows: summaries, headlines, news analysis, translation
//! and similarity lookup, wired over the lower-level modules.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use common::Config;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::llm::summarizer::{generate_headline, summarize_content};
use crate::llm::{LlmProvider, Summary};
use crate::news::NewsSearch;
use crate::records::save_translation;
use crate::scraping::scrape_webpage;
use crate::text::{combine_chunks, split_into_chunks, text_stats, TextStats};
use crate::translation::llm::refine_translation;
use crate::translation::{Language, TranslationCache};
use crate::vector_store::{Metadata, MetadataValue, SearchHit, SimilaritySearch};

/// Tunables taken from [`Config`].
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub chunk_size: usize,
    pub cache_clear_threshold: usize,
    pub output_dir: PathBuf,
    pub default_results: usize,
    pub summary_max_tokens: usize,
}

impl AssistantSettings {
    pub fn from_config(config: &Config) -> Self {
        let summary_max_tokens = config
            .llm
            .as_ref()
            .and_then(|l| l.summarization_endpoint())
            .and_then(|r| r.max_tokens)
            .unwrap_or(500);

        Self {
            chunk_size: config.translation.chunk_size.max(1),
            cache_clear_threshold: config.translation.cache_clear_threshold,
            output_dir: PathBuf::from(&config.translation.output_dir),
            default_results: config.vector_store.default_results,
            summary_max_tokens,
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of [`Assistant::translate`].
#[derive(Debug, Clone)]
pub struct TranslationReport {
    pub target: Language,
    /// Stats of the source text
    pub stats: TextStats,
    /// Translated chunks, in order
    pub chunks: Vec<String>,
    /// Chunks joined back together
    pub translation: String,
    /// LLM-polished version, when refinement ran and succeeded
    pub refined: Option<String>,
    /// Some chunk kept untranslated text after a backend failure
    pub degraded: bool,
    /// Saved JSON record, unless writing it failed
    pub record_path: Option<PathBuf>,
}

impl TranslationReport {
    /// Refined text when available, else the raw translation.
    pub fn final_text(&self) -> &str {
        self.refined.as_deref().unwrap_or(&self.translation)
    }
}

pub struct Assistant {
    llm: Arc<dyn LlmProvider>,
    translations: Mutex<TranslationCache>,
    store: SimilaritySearch,
    refiner: Option<Arc<dyn LlmProvider>>,
    news: NewsSearch,
    http: Client,
    settings: AssistantSettings,
}

impl Assistant {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        translations: TranslationCache,
        store: SimilaritySearch,
        news: NewsSearch,
        http: Client,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            llm,
            translations: Mutex::new(translations),
            store,
            refiner: None,
            news,
            http,
            settings,
        }
    }

    /// Enable the LLM refinement pass after machine translation.
    pub fn with_refiner(mut self, refiner: Arc<dyn LlmProvider>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Summarize `content` and keep it in the similarity store.
    pub async fn summarize(&self, content: &str) -> Result<Summary> {
        anyhow::ensure!(!content.trim().is_empty(), "nothing to summarize");

        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), "content".into());
        metadata.insert("timestamp".to_string(), Local::now().to_rfc3339().into());
        let id = format!("content_{}", Utc::now().format("%Y%m%d%H%M%S%3f"));

        if let Err(e) = self
            .store
            .add(vec![content.to_string()], Some(vec![metadata]), Some(vec![id]))
            .await
        {
            warn!("could not store content for similarity search: {:#}", e);
        }

        Ok(summarize_content(&*self.llm, content, self.settings.summary_max_tokens).await)
    }

    pub async fn headline(&self, content: &str) -> String {
        generate_headline(&*self.llm, content).await
    }

    /// Search news on `topic`, scrape and summarize each hit, and render a
    /// markdown report.
    pub async fn analyze_news(
        &self,
        topic: &str,
        location: Option<&str>,
        count: Option<usize>,
    ) -> String {
        let items = self.news.search_news(topic, location, count).await;
        if items.is_empty() {
            return format!("No news articles found for '{}'.", topic);
        }
        info!(topic, articles = items.len(), "analyzing news");

        let mut report = format!("# News: {}\n", topic);
        if let Some(loc) = location {
            report.push_str(&format!("_Location: {}_\n", loc));
        }

        for (i, item) in items.iter().enumerate() {
            let page = scrape_webpage(&self.http, &item.url).await;
            let input = if page.is_empty() {
                format!("{}\n\n{}", item.title, item.description)
            } else {
                page.to_report()
            };
            let summary =
                summarize_content(&*self.llm, &input, self.settings.summary_max_tokens).await;

            report.push_str(&format!("\n## {}. {}\n", i + 1, item.title));
            if !item.source.is_empty() {
                report.push_str(&format!("- Source: {}\n", item.source));
            }
            if !page.date.is_empty() {
                report.push_str(&format!("- Date: {}\n", page.date));
            }
            report.push_str(&format!("- URL: {}\n\n", item.url));
            report.push_str(&summary.to_markdown());
        }

        report
    }

    /// Translate `text` chunk by chunk through the cache, store the result,
    /// optionally refine it, and write a JSON record.
    pub async fn translate(&self, text: &str, target_language: &str) -> Result<TranslationReport> {
        let target: Language = target_language.parse()?;
        let stats = text_stats(text);
        let chunks = split_into_chunks(text, self.settings.chunk_size);

        let mut translated = Vec::with_capacity(chunks.len());
        let mut degraded = false;
        {
            let mut cache = self.translations.lock().await;
            if cache.len() > self.settings.cache_clear_threshold {
                cache.clear();
            }
            for chunk in &chunks {
                let result = cache.translate(chunk, target_language).await?;
                degraded |= result.is_degraded();
                translated.push(result.text);
            }
        }
        info!(lang = %target, chunks = translated.len(), degraded, "translation complete");

        self.store_translation(&translated, target).await;

        let translation = combine_chunks(&translated);
        let refined = match &self.refiner {
            Some(refiner) if !translated.is_empty() => {
                match refine_translation(refiner.as_ref(), text, &translated, target).await {
                    Ok(r) => Some(r.refined),
                    Err(e) => {
                        warn!("translation refinement failed, keeping raw translation: {:#}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let mut report = TranslationReport {
            target,
            stats,
            chunks: translated,
            translation,
            refined,
            degraded,
            record_path: None,
        };

        match save_translation(&self.settings.output_dir, text, report.final_text(), target.code())
            .await
        {
            Ok(path) => report.record_path = Some(path),
            Err(e) => warn!("failed to save translation record: {:#}", e),
        }

        Ok(report)
    }

    async fn store_translation(&self, chunks: &[String], target: Language) {
        if chunks.is_empty() {
            return;
        }
        let now = Local::now();
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();

        let metadatas = (0..chunks.len())
            .map(|i| {
                let mut m = Metadata::new();
                m.insert("type".to_string(), "translation".into());
                m.insert("chunk_index".to_string(), i.into());
                m.insert("target_lang".to_string(), MetadataValue::from(target.code()));
                m.insert("timestamp".to_string(), now.to_rfc3339().into());
                m
            })
            .collect();
        let ids = (0..chunks.len())
            .map(|i| format!("translation_{}_{}_{}", target.code(), stamp, i))
            .collect();

        if let Err(e) = self.store.add(chunks.to_vec(), Some(metadatas), Some(ids)).await {
            warn!("could not store translation for similarity search: {:#}", e);
        }
    }

    /// Documents most similar to `query`; `k` defaults to the configured count.
    pub async fn search_similar(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchHit>> {
        let k = k.unwrap_or(self.settings.default_results);
        self.store
            .search(query, k)
            .await
            .context("similarity search failed")
    }
}
