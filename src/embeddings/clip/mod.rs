
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ClipConfig;
use crate::embeddings::{Embedder, EmbeddingInput, l2_normalize};
use crate::{Result, SearchError};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Bound on fetching the image itself, separate from the inference call.
const IMAGE_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Client for the multimodal inference service. Embeds text and images into
/// the same vector space; both pathways return L2-normalized vectors so that
/// cosine collections rank consistently between ingestion and query time.
#[derive(Debug, Clone)]
pub struct ClipClient {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
    fetch_agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct TextEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl ClipClient {
    #[inline]
    pub fn new(config: &ClipConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|_| {
            SearchError::Config(format!("Invalid CLIP endpoint URL: {}", config.endpoint))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();
        let fetch_agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(IMAGE_FETCH_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.vector_size as usize,
            agent,
            fetch_agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Embed a text query through the model's text tower.
    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating multimodal text embedding (length: {})", text.len());

        let url = self
            .endpoint
            .join("/embed/text")
            .map_err(|e| SearchError::Embedding(format!("Failed to build text URL: {e}")))?;

        let request = TextEmbedRequest {
            model: &self.model,
            input: text,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| SearchError::Embedding(format!("Failed to serialize request: {e}")))?;

        let mut request_builder = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("api-key", key);
        }

        let response_text = request_builder
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| SearchError::Embedding(format!("Inference request failed: {e}")))?;

        self.parse_embedding(&response_text)
    }

    /// Embed an image by URL: fetch the bytes with a bounded timeout, then
    /// run them through the model's image tower.
    #[inline]
    pub fn embed_image_url(&self, image_url: &Url) -> Result<Vec<f32>> {
        debug!("Generating image embedding for {image_url}");

        let bytes = self
            .fetch_agent
            .get(image_url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_vec())
            .map_err(|e| {
                SearchError::Embedding(format!("Failed to fetch image {image_url}: {e}"))
            })?;

        let mut url = self
            .endpoint
            .join("/embed/image")
            .map_err(|e| SearchError::Embedding(format!("Failed to build image URL: {e}")))?;
        url.query_pairs_mut().append_pair("model", &self.model);

        let mut request_builder = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/octet-stream");
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("api-key", key);
        }

        let response_text = request_builder
            .send(&bytes[..])
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| SearchError::Embedding(format!("Inference request failed: {e}")))?;

        self.parse_embedding(&response_text)
    }

    fn parse_embedding(&self, response_text: &str) -> Result<Vec<f32>> {
        let response: EmbedResponse = serde_json::from_str(response_text)
            .map_err(|e| SearchError::Embedding(format!("Failed to parse response: {e}")))?;

        if response.embedding.is_empty() {
            return Err(SearchError::Embedding(
                "Response carried no embedding".to_string(),
            ));
        }

        debug!(
            "Generated embedding with {} dimensions",
            response.embedding.len()
        );
        Ok(l2_normalize(&response.embedding))
    }
}

impl Embedder for ClipClient {
    #[inline]
    fn embed(&self, input: &EmbeddingInput) -> Result<Vec<f32>> {
        match input {
            EmbeddingInput::Text(text) => self.embed_text(text),
            EmbeddingInput::ImageUrl(url) => self.embed_image_url(url),
        }
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}
