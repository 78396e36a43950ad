//! Embedding providers
//!
//! Each provider performs exactly one HTTP attempt per call and maps the outcome
//! onto the crate error taxonomy. Retry, fallback and batching policy live in
//! [`EmbeddingService`](super::EmbeddingService).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::RETRY_AFTER;
use tracing::debug;

use crate::error::{Error, Result};

use super::similarity::normalize;
use super::text::tokenize;
use super::types::{
    DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_URL, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL,
    EmbeddingInput, LOCAL_BATCH_SIZE, LocalEmbeddingRequest, LocalEmbeddingResponse,
    OPENAI_BATCH_SIZE, OpenAiEmbeddingRequest, OpenAiEmbeddingResponse,
};

/// Default per-request timeout for provider HTTP calls
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A backend that turns text into vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in errors and logs
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Whether `embed_batch` sends many inputs in one request
    fn supports_batch(&self) -> bool;

    fn default_batch_size(&self) -> usize;

    /// Embed one already-sanitized text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.
    ///
    /// The default issues one request per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// OpenAI-compatible `/embeddings` endpoint
#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: HttpClient,
    api_key: String,
    url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish()
    }
}

/// Builder for creating an OpenAiProvider
#[derive(Default)]
pub struct OpenAiProviderBuilder {
    api_key: Option<String>,
    url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAiProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Full endpoint URL (defaults to the public OpenAI endpoint)
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<OpenAiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("API key is required for the openai provider".to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(
                self.timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            )
            .build()?;

        Ok(OpenAiProvider {
            http_client,
            api_key,
            url: self.url.unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            model: self.model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }
}

impl OpenAiProvider {
    pub fn builder() -> OpenAiProviderBuilder {
        OpenAiProviderBuilder::new()
    }

    async fn request(&self, input: EmbeddingInput) -> Result<OpenAiEmbeddingResponse> {
        let request = OpenAiEmbeddingRequest {
            model: self.model.clone(),
            input,
        };

        debug!(model = %self.model, url = %self.url, "Sending embedding request");

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(self.name(), response).await);
        }

        response
            .json::<OpenAiEmbeddingResponse>()
            .await
            .map_err(|e| malformed(self.name(), e))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn default_batch_size(&self) -> usize {
        OPENAI_BATCH_SIZE
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self.request(EmbeddingInput::Single(text.to_string())).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::ProviderResponse {
                provider: self.name().to_string(),
                status: None,
                message: "Empty embedding response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.request(EmbeddingInput::Batch(texts.to_vec())).await?;
        if response.data.len() != texts.len() {
            return Err(Error::ProviderResponse {
                provider: self.name().to_string(),
                status: None,
                message: format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    response.data.len()
                ),
            });
        }

        // Sort by index to maintain order
        let mut data: Vec<_> = response.data.into_iter().enumerate().collect();
        data.sort_by_key(|(position, d)| d.index.unwrap_or(*position));
        Ok(data.into_iter().map(|(_, d)| d.embedding).collect())
    }
}

/// Self-hosted endpoint speaking `{model, prompt}` -> `{embedding}`
#[derive(Debug, Clone)]
pub struct LocalProvider {
    http_client: HttpClient,
    url: String,
    model: String,
}

impl LocalProvider {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_LOCAL_URL,
            DEFAULT_LOCAL_MODEL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_batch(&self) -> bool {
        false
    }

    fn default_batch_size(&self) -> usize {
        LOCAL_BATCH_SIZE
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = LocalEmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        debug!(model = %self.model, url = %self.url, "Sending local embedding request");

        let response = self.http_client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(self.name(), response).await);
        }

        let body: LocalEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| malformed(self.name(), e))?;
        Ok(body.embedding)
    }
}

/// Deterministic offline embedder.
///
/// Hashes lowercase tokens into a fixed number of buckets and normalizes, so
/// texts sharing words land close together. Keeps tests fast and hermetic.
#[derive(Debug, Clone)]
pub struct SimpleEmbeddingProvider {
    dimension: usize,
}

impl Default for SimpleEmbeddingProvider {
    fn default() -> Self {
        Self { dimension: 64 }
    }
}

impl SimpleEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0; self.dimension];
        if self.dimension == 0 {
            return vec;
        }
        for token in tokenize(text) {
            let idx = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vec[idx] += 1.0;
        }
        normalize(&mut vec);
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for SimpleEmbeddingProvider {
    fn name(&self) -> &str {
        "simple"
    }

    fn model(&self) -> &str {
        "simple-hash"
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn default_batch_size(&self) -> usize {
        OPENAI_BATCH_SIZE
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Map a non-success response onto the error taxonomy
async fn error_from_response(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let header_retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    classify_status(provider, status.as_u16(), header_retry_after, &body)
}

fn classify_status(provider: &str, status: u16, retry_after: Option<u64>, body: &str) -> Error {
    match status {
        429 => Error::RateLimited {
            provider: provider.to_string(),
            retry_after_secs: retry_after.or_else(|| extract_retry_after(body)),
        },
        500..=599 => Error::ProviderUnavailable {
            provider: provider.to_string(),
            status,
            message: truncate_body(body),
        },
        _ => Error::ProviderResponse {
            provider: provider.to_string(),
            status: Some(status),
            message: truncate_body(body),
        },
    }
}

fn malformed(provider: &str, err: reqwest::Error) -> Error {
    Error::ProviderResponse {
        provider: provider.to_string(),
        status: None,
        message: format!("Failed to parse response: {err}"),
    }
}

/// Extract a retry-after hint from a JSON error body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}...")
    }
}
