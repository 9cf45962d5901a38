//! OpenAI-compatible chat + embeddings client.
//!
//! Serves two collaborator roles: [`Summarizer`] through chat completions
//! (JSON-object mode for page verdicts, plain text for topics) and
//! [`Embedder`] through the embeddings endpoint.

use std::time::Duration;

use async_trait::async_trait;
use linkdigest_shared::{EmbeddingConfig, LinkDigestError, LlmConfig, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::traits::{Embedder, Summarizer, SummaryVerdict};

const SUMMARY_SYSTEM_PROMPT: &str = "You review web pages for a reading digest. \
Decide whether the page has substantive content worth reading later (articles, \
documentation, essays, papers). Login walls, error pages, cookie notices, link \
farms and empty shells are not useful. Reply with a JSON object \
{\"is_useful\": bool, \"summary\": string}. When useful, the summary is a detailed \
paragraph covering the main points; otherwise it is an empty string.";

const TOPIC_SYSTEM_PROMPT: &str = "You name groups of related texts. Reply with \
the common topic of the texts in one or two words, without punctuation or quotes.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_input_chars: usize,
    embedding_model: String,
    dimensions: Option<usize>,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        llm: &LlmConfig,
        embedding: &EmbeddingConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(llm.request_timeout_secs))
            .build()
            .map_err(|e| LinkDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            model: llm.model.clone(),
            max_input_chars: llm.max_input_chars,
            embedding_model: embedding.model.clone(),
            dimensions: embedding.dimensions,
        })
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &T,
    ) -> Result<R> {
        let endpoint = format!("{}/{route}", self.base_url);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LinkDigestError::Network(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LinkDigestError::Network(format!(
                "{endpoint}: HTTP {status}: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LinkDigestError::parse(format!("{route} response: {e}")))
    }

    async fn chat(&self, system: &str, user: String, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::new("system", system), ChatMessage::new("user", user)],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.model, json_mode, "chat request");
        let response: ChatResponse = self.post("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LinkDigestError::parse("chat response has no content"))
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => &text[..cut],
            None => text,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    #[instrument(skip_all, fields(chars = text.len()))]
    async fn summarize_one(&self, text: &str) -> Result<SummaryVerdict> {
        let content = self
            .chat(SUMMARY_SYSTEM_PROMPT, self.truncate(text).to_string(), true)
            .await?;

        serde_json::from_str(&content)
            .map_err(|e| LinkDigestError::parse(format!("summary verdict is not valid JSON: {e}")))
    }

    #[instrument(skip_all, fields(texts = texts.len()))]
    async fn summarize_topic(&self, texts: &[String]) -> Result<String> {
        let joined = texts
            .iter()
            .map(|t| self.truncate(t))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let topic = self.chat(TOPIC_SYSTEM_PROMPT, joined, false).await?;
        Ok(topic.trim().trim_matches('"').trim().to_string())
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    #[instrument(skip_all, fields(texts = texts.len(), model = %self.embedding_model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts.iter().map(|t| t.replace('\n', " ")).collect(),
            dimensions: self.dimensions,
        };

        let response: EmbeddingResponse = self.post("embeddings", &request).await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
