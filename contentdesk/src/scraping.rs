use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::io::Cursor;
use std::time::Duration;
use tracing::{info, warn};

const NO_TITLE: &str = "No title found";
const NO_DATE: &str = "No date found";

/// Text pulled out of a single web page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: String,
    pub date: String,
    pub content: String,
}

impl ScrapedPage {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Plain-text block used as LLM input and in reports.
    pub fn to_report(&self) -> String {
        format!(
            "Title: {}\nDate: {}\n\nContent:\n{}",
            self.title, self.date, self.content
        )
    }
}

pub fn build_client(timeout_secs: u64, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .context("failed to build reqwest client")
}

/// GET a page and return its body. Non-2xx statuses are errors.
pub async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await.context("failed to fetch page")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow::anyhow!("page fetch failed with status: {}", status));
    }

    response.text().await.context("failed to read response body")
}

/// Fetch and extract a page. Never fails: errors are logged and an empty
/// page is returned.
pub async fn scrape_webpage(client: &Client, url: &str) -> ScrapedPage {
    match fetch_html(client, url).await {
        Ok(html) => {
            let page = extract_page(&html, url);
            info!("scraping: {} chars of content from {}", page.content.len(), url);
            page
        }
        Err(e) => {
            warn!("scraping: failed for {}: {:#}", url, e);
            ScrapedPage::default()
        }
    }
}

/// Title, publication date and main text of an HTML document.
pub fn extract_page(html: &str, url: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let content = readable_content(html, url)
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| paragraph_text(&document));

    ScrapedPage {
        title: page_title(&document).unwrap_or_else(|| NO_TITLE.to_string()),
        date: page_date(&document).unwrap_or_else(|| NO_DATE.to_string()),
        content: content.trim().to_string(),
    }
}

/// Main content via readability, rendered to text with html2text.
fn readable_content(html: &str, url: &str) -> Option<String> {
    // Readability resolves relative links against the page URL
    let url_obj = match url::Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            warn!("scraping: invalid URL {}: {}", url, e);
            return None;
        }
    };

    let mut reader = Cursor::new(html.as_bytes());
    match readability::extractor::extract(&mut reader, &url_obj) {
        Ok(product) => match html2text::from_read(product.content.as_bytes(), 80) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("scraping: failed to convert extracted HTML to text: {}", e);
                Some(product.text)
            }
        },
        Err(e) => {
            warn!("scraping: readability failed for {}: {}", url, e);
            None
        }
    }
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// First `time`, `span` or `div` whose class mentions a date, else the first
/// `<time>`. The `datetime` attribute wins over the element text.
fn page_date(document: &Html) -> Option<String> {
    let selector = Selector::parse("time, span, div").ok()?;

    let element = document
        .select(&selector)
        .find(has_date_class)
        .or_else(|| document.select(&selector).find(|el| el.value().name() == "time"))?;

    element
        .value()
        .attr("datetime")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .or_else(|| {
            Some(element.text().collect::<String>().trim().to_string()).filter(|t| !t.is_empty())
        })
}

fn has_date_class(el: &ElementRef) -> bool {
    el.value()
        .attr("class")
        .map(|c| ["date", "published", "timestamp"].iter().any(|k| c.contains(k)))
        .unwrap_or(false)
}

fn inside_page_chrome(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "nav" | "footer" | "header" | "script" | "style"))
}

/// Paragraphs under article-like containers, or every paragraph when the page
/// has none. Navigation, header and footer text is skipped.
fn paragraph_text(document: &Html) -> String {
    let containers = [
        "article p",
        "main p",
        "div.content p",
        "div.article p",
        "div.post p",
    ];

    let collect = |selector: &Selector| -> Vec<String> {
        document
            .select(selector)
            .filter(|p| !inside_page_chrome(p))
            .map(|p| p.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    };

    let mut paragraphs = Vec::new();
    if let Ok(selector) = Selector::parse(&containers.join(", ")) {
        paragraphs = collect(&selector);
    }
    if paragraphs.is_empty() {
        if let Ok(selector) = Selector::parse("p") {
            paragraphs = collect(&selector);
        }
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html>
          <head><title> Rust 2.0 Released </title></head>
          <body>
            <header><p>Site banner</p></header>
            <nav><p>Home | World | Tech</p></nav>
            <article>
              <span class="post-date" datetime="2024-05-01">May 1</span>
              <p>The Rust team announced a new release today.</p>
              <p>It ships faster compile times and better diagnostics.</p>
            </article>
            <footer><p>Copyright notice</p></footer>
          </body>
        </html>"#;

    #[test]
    fn extracts_title_and_date_attribute() {
        let page = extract_page(ARTICLE, "https://example.com/news/rust");
        assert_eq!(page.title, "Rust 2.0 Released");
        assert_eq!(page.date, "2024-05-01");
        assert!(page.content.contains("announced a new release"));
    }

    #[test]
    fn paragraph_fallback_skips_page_chrome() {
        let text = paragraph_text(&Html::parse_document(ARTICLE));
        assert_eq!(
            text,
            "The Rust team announced a new release today.\n\n\
             It ships faster compile times and better diagnostics."
        );
    }

    #[test]
    fn paragraph_fallback_uses_all_paragraphs_without_containers() {
        let html = "<html><body><p>Loose one.</p><div><p>Loose two.</p></div></body></html>";
        assert_eq!(
            paragraph_text(&Html::parse_document(html)),
            "Loose one.\n\nLoose two."
        );
    }

    #[test]
    fn date_falls_back_to_time_text() {
        let html = "<html><body><time>Yesterday</time><p>x</p></body></html>";
        assert_eq!(page_date(&Html::parse_document(html)).as_deref(), Some("Yesterday"));
    }

    #[test]
    fn missing_metadata_uses_placeholders() {
        let page = extract_page("<html><body><p>Only text.</p></body></html>", "not a url");
        assert_eq!(page.title, NO_TITLE);
        assert_eq!(page.date, NO_DATE);
        assert_eq!(page.content, "Only text.");
    }

    #[test]
    fn report_layout() {
        let page = ScrapedPage {
            title: "T".into(),
            date: "D".into(),
            content: "Body".into(),
        };
        assert_eq!(page.to_report(), "Title: T\nDate: D\n\nContent:\nBody");
    }
}
