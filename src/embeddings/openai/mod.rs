
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, EmbeddingInput};
use crate::{Result, SearchError};

const DEFAULT_API_BASE: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the hosted text-embedding API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            SearchError::Config(
                "OpenAI API key is required for text embeddings (set OPENAI_API_KEY)".to_string(),
            )
        })?;

        let base_url = Url::parse(DEFAULT_API_BASE)
            .map_err(|e| SearchError::Embedding(format!("Invalid API base URL: {e}")))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            model: config.model.clone(),
            dimension: config.vector_size as usize,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Generate an embedding for a single text input.
    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating text embedding (length: {})", text.len());

        let url = self
            .base_url
            .join("/v1/embeddings")
            .map_err(|e| SearchError::Embedding(format!("Failed to build embeddings URL: {e}")))?;

        let request = EmbeddingsRequest {
            model: &self.model,
            input: text,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| SearchError::Embedding(format!("Failed to serialize request: {e}")))?;

        let response_text = self.request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbeddingsResponse = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Embedding(format!("Failed to parse response: {e}")))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SearchError::Embedding("Response carried no embedding".to_string()))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("Embedding request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Provider returned status {}, attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(SearchError::Embedding(format!(
                                    "Provider rejected request: HTTP {status}"
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            return Err(SearchError::Embedding(format!(
                                "Non-retryable error: {error}"
                            )));
                        }
                    };

                    if should_retry {
                        last_error = Some(error);
                        if attempt < self.retry_attempts {
                            let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                            std::thread::sleep(Duration::from_millis(delay_ms));
                        }
                    }
                }
            }
        }

        error!("All retry attempts failed for {}", self.base_url);
        Err(SearchError::Embedding(match last_error {
            Some(e) => format!("Request failed after retries: {e}"),
            None => "Request failed after retries".to_string(),
        }))
    }
}

impl Embedder for OpenAiClient {
    #[inline]
    fn embed(&self, input: &EmbeddingInput) -> Result<Vec<f32>> {
        match input {
            EmbeddingInput::Text(text) => self.embed_text(text),
            EmbeddingInput::ImageUrl(_) => Err(SearchError::Embedding(
                "Text-embedding provider cannot embed images".to_string(),
            )),
        }
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}
