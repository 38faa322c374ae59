//! News search through a web search engine's news vertical.
//!
//! Results are scraped from the engine's HTML, restricted to a list of
//! trusted outlets and ordered so that wire services come first.

use anyhow::{Context, Result};
use common::SearchConfig;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::scraping::{build_client, fetch_html};

/// One news search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub description: String,
    pub source: String,
}

pub struct NewsSearch {
    client: Client,
    engine_url: String,
    sources: Vec<String>,
    priority_sources: Vec<String>,
    default_count: usize,
}

impl NewsSearch {
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds, &config.user_agent)?,
            engine_url: config.engine_url.clone(),
            sources: config.news_sources.clone(),
            priority_sources: config.priority_sources.clone(),
            default_count: config.default_count,
        })
    }

    /// `topic [location] news latest recent (site:a OR site:b ...)`
    pub fn build_query(&self, topic: &str, location: Option<&str>) -> String {
        let mut parts = vec![topic.trim()];
        if let Some(loc) = location.map(str::trim).filter(|l| !l.is_empty()) {
            parts.push(loc);
        }
        parts.extend(["news", "latest", "recent"]);

        let mut query = parts.join(" ");
        if !self.sources.is_empty() {
            let sites = self
                .sources
                .iter()
                .map(|s| format!("site:{}", s))
                .collect::<Vec<_>>()
                .join(" OR ");
            query.push_str(&format!(" ({})", sites));
        }
        query
    }

    /// News-vertical search URL limited to the last day.
    pub fn search_url(&self, topic: &str, location: Option<&str>, count: usize) -> Result<Url> {
        let query = self.build_query(topic, location);
        let count = count.to_string();
        Url::parse_with_params(
            &self.engine_url,
            &[
                ("q", query.as_str()),
                ("tbm", "nws"),
                ("tbs", "qdr:d"),
                ("hl", "en"),
                ("num", count.as_str()),
            ],
        )
        .with_context(|| format!("invalid search engine URL: {}", self.engine_url))
    }

    /// Search, filter and rank news. Errors are logged and yield no results.
    pub async fn search_news(
        &self,
        topic: &str,
        location: Option<&str>,
        count: Option<usize>,
    ) -> Vec<NewsItem> {
        let count = count.unwrap_or(self.default_count);
        match self.try_search(topic, location, count).await {
            Ok(items) => {
                info!(topic, results = items.len(), "news search complete");
                items
            }
            Err(e) => {
                warn!(topic, "news search failed: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        topic: &str,
        location: Option<&str>,
        count: usize,
    ) -> Result<Vec<NewsItem>> {
        let url = self.search_url(topic, location, count)?;
        debug!(url = %url, "querying search engine");
        let html = fetch_html(&self.client, url.as_str()).await?;

        let mut items = extract_news_links(&html, &self.sources);
        prioritize(&mut items, &self.priority_sources);
        items.truncate(count);
        Ok(items)
    }
}

fn from_source(url: &str, sources: &[String]) -> bool {
    let url = url.to_lowercase();
    sources.iter().any(|s| url.contains(&s.to_lowercase()))
}

/// Stable reorder: items from `priority` domains first.
pub fn prioritize(items: &mut [NewsItem], priority: &[String]) {
    items.sort_by_key(|item| !from_source(&item.url, priority));
}

/// Search engines sometimes wrap result links as `/url?q=<target>`.
fn resolve_href(href: &str) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    if href.starts_with("/url?") {
        let base = Url::parse("https://search.invalid").ok()?;
        let wrapped = base.join(href).ok()?;
        return wrapped
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "url")
            .map(|(_, v)| v.into_owned())
            .filter(|v| v.starts_with("http"));
    }
    None
}

fn first_text(container: &ElementRef, selector: &Selector) -> Option<String> {
    container
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// Parse result containers from a news search page, keeping only links to
/// `sources`.
pub fn extract_news_links(html: &str, sources: &[String]) -> Vec<NewsItem> {
    let document = Html::parse_document(html);
    let (Ok(containers), Ok(links), Ok(titles), Ok(snippets), Ok(source_labels)) = (
        Selector::parse("div.g, div.SoaBEf, article.g, article.SoaBEf"),
        Selector::parse("a[href]"),
        Selector::parse("h3, h4"),
        Selector::parse("div.VwiC3b, span.VwiC3b, div.yXK7lf, span.yXK7lf"),
        Selector::parse("div.UPmit, span.UPmit, div.yXK7lf, span.yXK7lf"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for result in document.select(&containers) {
        let Some(url) = result
            .select(&links)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(resolve_href)
        else {
            continue;
        };

        let Some(title) = first_text(&result, &titles).filter(|t| !t.is_empty()) else {
            continue;
        };

        if !from_source(&url, sources) || !seen.insert(url.clone()) {
            continue;
        }

        items.push(NewsItem {
            title,
            description: first_text(&result, &snippets).unwrap_or_default(),
            source: first_text(&result, &source_labels).unwrap_or_default(),
            url,
        });
    }

    debug!("extracted {} news links", items.len());
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search() -> NewsSearch {
        NewsSearch::from_config(&SearchConfig::default()).unwrap()
    }

    fn sources() -> Vec<String> {
        SearchConfig::default().news_sources
    }

    const RESULTS: &str = r#"
        <html><body>
          <div class="SoaBEf">
            <a href="https://www.cnn.com/2024/tech/story">
              <h3>CNN covers the chip shortage</h3>
              <div class="VwiC3b">Supply remains tight.</div>
              <span class="UPmit">CNN</span>
            </a>
          </div>
          <div class="g">
            <a href="https://blog.example.org/post"><h3>Unvetted blog</h3></a>
          </div>
          <div class="g">
            <a href="/url?q=https://www.reuters.com/markets/chips&sa=U"><h3>Reuters on chips</h3></a>
          </div>
          <div class="g">
            <a href="https://www.bbc.com/news/no-title"></a>
          </div>
          <article class="g">
            <a href="https://apnews.com/article/chips"><h4>AP chips wrap</h4></a>
          </article>
        </body></html>"#;

    #[test]
    fn query_contains_topic_location_and_sites() {
        let q = search().build_query("elections", Some("Dhaka"));
        assert!(q.starts_with("elections Dhaka news latest recent ("));
        assert!(q.contains("site:reuters.com OR site:apnews.com"));
        assert!(q.ends_with(')'));

        let q = search().build_query("elections", Some("  "));
        assert!(q.starts_with("elections news latest recent"));
    }

    #[test]
    fn search_url_carries_news_parameters() {
        let url = search().search_url("ai", None, 7).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("tbm".into(), "nws".into())));
        assert!(pairs.contains(&("tbs".into(), "qdr:d".into())));
        assert!(pairs.contains(&("hl".into(), "en".into())));
        assert!(pairs.contains(&("num".into(), "7".into())));
        assert!(pairs.iter().any(|(k, v)| k == "q" && v.starts_with("ai news latest recent")));
    }

    #[test]
    fn extracts_trusted_results_only() {
        let items = extract_news_links(RESULTS, &sources());
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.cnn.com/2024/tech/story",
                "https://www.reuters.com/markets/chips",
                "https://apnews.com/article/chips",
            ]
        );
        assert_eq!(items[0].title, "CNN covers the chip shortage");
        assert_eq!(items[0].description, "Supply remains tight.");
        assert_eq!(items[0].source, "CNN");
        assert_eq!(items[2].title, "AP chips wrap");
    }

    #[test]
    fn priority_sources_first_and_stable() {
        let mut items = extract_news_links(RESULTS, &sources());
        prioritize(&mut items, &SearchConfig::default().priority_sources);
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.reuters.com/markets/chips",
                "https://apnews.com/article/chips",
                "https://www.cnn.com/2024/tech/story",
            ]
        );
    }

    #[test]
    fn relative_links_are_ignored() {
        assert_eq!(resolve_href("/search?q=x"), None);
        assert_eq!(resolve_href("/url?q=ftp://x"), None);
        assert_eq!(
            resolve_href("http://bbc.com/a").as_deref(),
            Some("http://bbc.com/a")
        );
    }
}
