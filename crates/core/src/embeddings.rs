use crate::config::OpenAiConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// text-embedding-ada-002 output width.
pub const OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait Embedder {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    /// Embeds a batch, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;
}

/// Deterministic local embedder hashing character trigrams into a
/// normalized bucket vector. No network, stable across runs; used for
/// offline operation and tests.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// OpenAI embeddings client. Retries 429s, server errors, and transport
/// failures with capped exponential backoff.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig) -> Result<Self, SearchError> {
        let endpoint = config.endpoint("embeddings")?.to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(auth_headers(&config.api_key)?)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.embed_model.clone(),
            dimensions: OPENAI_EMBEDDING_DIMENSIONS,
            max_retries: 3,
        })
    }

    async fn request_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0usize;
        loop {
            let body = EmbeddingRequest {
                model: &self.model,
                input: inputs,
            };
            let response = self.client.post(&self.endpoint).json(&body).send().await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = response.json().await?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(SearchError::Upstream {
                                service: "openai-embeddings".to_string(),
                                details: format!(
                                    "{} embeddings returned for {} inputs",
                                    parsed.data.len(),
                                    inputs.len()
                                ),
                            });
                        }
                        return Ok(parsed
                            .data
                            .into_iter()
                            .map(|entry| entry.embedding)
                            .collect());
                    }

                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }

                    let details = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    return Err(SearchError::Upstream {
                        service: "openai-embeddings".to_string(),
                        details: format!("{status}: {details}"),
                    });
                }
                Err(error) => {
                    if is_retryable_error(&error) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(SearchError::Http(error));
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let inputs = [text.to_string()];
        self.request_embeddings(&inputs)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Upstream {
                service: "openai-embeddings".to_string(),
                details: "empty embedding response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        self.request_embeddings(texts).await
    }
}

pub(crate) fn auth_headers(api_key: &str) -> Result<HeaderMap, SearchError> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    let value = HeaderValue::from_str(&auth)
        .map_err(|error| SearchError::Request(format!("invalid api key: {error}")))?;
    headers.insert(AUTHORIZATION, value);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
