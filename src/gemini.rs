//! Default `EmbeddingProvider` binding: Google Generative Language
//! `embedContent` REST API.
//!
//! The API key comes from explicit configuration or the `GENAI_API_KEY`
//! environment variable; its absence is detected at construction. The HTTP
//! client itself is built lazily on first use. Items of a batch are issued
//! concurrently and re-assembled in input order.

use async_trait::async_trait;
use futures::future::try_join_all;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{EmbeddingProvider, ProviderFault};
use crate::error::{DetectError, Result};

pub const DEFAULT_MODEL: &str = "text-embedding-004";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiConfig {
    /// Explicit API key; falls back to `GENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct GeminiEmbedder {
    api_key: String,
    model: String,
    base_url: String,
    client: OnceCell<reqwest::Client>,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GENAI_API_KEY").ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| DetectError::Config("API key is required".to_string()))?;
        Ok(Self {
            api_key,
            model: config.model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: OnceCell::new(),
        })
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(reqwest::Client::new)
    }

    async fn embed_one(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderFault> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
        };
        let response = self
            .client()
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderFault(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(ProviderFault(format!("HTTP {status}: {detail}")));
        }
        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderFault(format!("malformed response: {e}")))?;
        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn generate_embeddings(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderFault> {
        debug!(count = texts.len(), model = %self.model, "embedding batch");
        // try_join_all preserves input order regardless of completion order.
        try_join_all(texts.iter().map(|t| self.embed_one(t))).await
    }
}
