//! Direct-fetch extractor.
//!
//! Fetches each URL itself, picks the main content block of the page and
//! converts it to Markdown text locally. Needs no API key. The canonical URL
//! is wherever redirects ended up.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use linkdigest_shared::{ExtractionConfig, LinkDigestError, Result};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::traits::{ExtractedPage, Extractor};

/// Maximum number of redirects to follow per page.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("LinkDigest/", env!("CARGO_PKG_VERSION"));

/// Candidate main-content containers, most specific first.
const CONTENT_SELECTORS: [&str; 4] = ["main", "article", r#"[role="main"]"#, "body"];

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Extractor that downloads pages and converts their HTML to text.
pub struct PageExtractor {
    http: Client,
}

impl PageExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LinkDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }

    async fn fetch(&self, url: &str) -> Result<(Url, String)> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| LinkDigestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkDigestError::Network(format!("{url}: HTTP {status}")));
        }

        let canonical = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| LinkDigestError::Network(format!("{url}: failed to read body: {e}")))?;

        Ok((canonical, body))
    }
}

#[async_trait]
impl Extractor for PageExtractor {
    #[instrument(skip_all, fields(urls = urls.len()))]
    async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>> {
        let mut pages = Vec::with_capacity(urls.len());

        for url in urls {
            let (canonical, html) = match self.fetch(url).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    debug!(%url, error = %e, "page not fetched");
                    continue;
                }
            };

            match html_to_text(&html) {
                Ok(text) => pages.push(ExtractedPage {
                    requested: url.clone(),
                    url: canonical.to_string(),
                    text,
                }),
                Err(e) => debug!(%url, error = %e, "page not converted"),
            }
        }

        Ok(pages)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Convert an HTML document to Markdown text, keeping only the main content.
pub fn html_to_text(html: &str) -> Result<String> {
    let doc = Html::parse_document(html);

    let content_html = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| doc.select(&sel).next().map(|el| el.inner_html()))
        .unwrap_or_default();

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
        ])
        .build();

    let markdown = converter
        .convert(&content_html)
        .map_err(|e| LinkDigestError::parse(format!("html conversion failed: {e}")))?;

    Ok(BLANK_RUNS.replace_all(markdown.trim(), "\n\n").into_owned())
}
