//! Tavily extract API client.
//!
//! `POST {base_url}/extract` with a list of URLs; the response carries the
//! raw page content of every URL that could be fetched, keyed by the URL
//! Tavily resolved, plus a list of the ones that failed.

use std::time::Duration;

use async_trait::async_trait;
use linkdigest_shared::{ExtractionConfig, LinkDigestError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::traits::{ExtractedPage, Extractor};

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    urls: &'a [String],
    extract_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractResult>,
    #[serde(default)]
    failed_results: Vec<FailedResult>,
}

#[derive(Debug, Deserialize)]
struct ExtractResult {
    url: String,
    #[serde(default)]
    raw_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailedResult {
    url: String,
    #[serde(default)]
    error: Option<String>,
}

/// Extractor backed by the Tavily extract endpoint.
pub struct TavilyExtractor {
    http: Client,
    api_key: String,
    base_url: String,
    extract_depth: String,
}

impl TavilyExtractor {
    pub fn new(api_key: impl Into<String>, config: &ExtractionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LinkDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            extract_depth: config.extract_depth.clone(),
        })
    }
}

#[async_trait]
impl Extractor for TavilyExtractor {
    #[instrument(skip_all, fields(urls = urls.len()))]
    async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>> {
        let endpoint = format!("{}/extract", self.base_url);
        let request = ExtractRequest {
            urls,
            extract_depth: &self.extract_depth,
        };

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LinkDigestError::Network(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkDigestError::Network(format!(
                "{endpoint}: HTTP {status}: {body}"
            )));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| LinkDigestError::parse(format!("tavily extract response: {e}")))?;

        for failed in &parsed.failed_results {
            debug!(
                url = %failed.url,
                error = failed.error.as_deref().unwrap_or("unknown"),
                "url not extracted"
            );
        }

        let positional = parsed.results.len() == urls.len() && parsed.failed_results.is_empty();
        Ok(parsed
            .results
            .into_iter()
            .enumerate()
            .map(|(i, r)| ExtractedPage {
                requested: requested_for(&r.url, urls, positional.then_some(i)),
                url: r.url,
                text: r.raw_content.unwrap_or_default(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Pair a result URL with the URL that was asked for. Exact matches win;
/// otherwise a complete response is assumed to be in request order.
fn requested_for(result_url: &str, urls: &[String], position: Option<usize>) -> String {
    if let Some(exact) = urls.iter().find(|u| u.as_str() == result_url) {
        return exact.clone();
    }
    position
        .and_then(|i| urls.get(i))
        .cloned()
        .unwrap_or_else(|| result_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(server: &MockServer) -> TavilyExtractor {
        let config = ExtractionConfig {
            base_url: server.uri(),
            ..ExtractionConfig::default()
        };
        TavilyExtractor::new("tvly-test", &config).unwrap()
    }

    #[tokio::test]
    async fn extract_returns_canonical_urls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(header("authorization", "Bearer tvly-test"))
            .and(body_partial_json(serde_json::json!({
                "urls": ["http://a", "http://b"],
                "extract_depth": "basic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"url": "https://a.example/", "raw_content": "page a"},
                    {"url": "http://b", "raw_content": null}
                ],
                "failed_results": []
            })))
            .mount(&server)
            .await;

        let pages = extractor(&server)
            .extract(&["http://a".into(), "http://b".into()])
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].url, "https://a.example/");
        assert_eq!(pages[0].requested, "http://a");
        assert_eq!(pages[0].text, "page a");
        assert_eq!(pages[1].requested, "http://b");
        assert_eq!(pages[1].text, "");
    }

    #[test]
    fn requested_url_prefers_exact_match() {
        let urls = vec!["http://a".to_string(), "http://b".to_string()];
        assert_eq!(requested_for("http://b", &urls, Some(0)), "http://b");
        assert_eq!(requested_for("https://b.example/", &urls, Some(1)), "http://b");
        assert_eq!(requested_for("https://b.example/", &urls, None), "https://b.example/");
    }

    #[tokio::test]
    async fn failed_urls_are_omitted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"url": "http://a", "raw_content": "ok"}],
                "failed_results": [{"url": "http://b", "error": "timeout"}]
            })))
            .mount(&server)
            .await;

        let pages = extractor(&server)
            .extract(&["http://a".into(), "http://b".into()])
            .await
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "http://a");
        assert_eq!(pages[0].requested, "http://a");
    }

    #[tokio::test]
    async fn http_error_fails_the_call() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = extractor(&server).extract(&["http://a".into()]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, LinkDigestError::Network(_)));
        assert!(err.to_string().contains("503"));
    }
}
