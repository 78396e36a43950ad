//! Embedding provider types and wire formats

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dimension every stored and queried vector must have unless configured otherwise
pub const DEFAULT_DIMENSION: usize = 1536;

/// Default OpenAI-compatible embeddings endpoint
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default cloud embedding model
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Default local (Ollama-style) embeddings endpoint
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434/api/embeddings";

/// Default local embedding model
pub const DEFAULT_LOCAL_MODEL: &str = "nomic-embed-text";

/// Texts per request for the cloud provider
pub const OPENAI_BATCH_SIZE: usize = 100;

/// Texts per request for the local provider
pub const LOCAL_BATCH_SIZE: usize = 10;

/// In-flight requests when driving a provider without batch support
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 5;

/// Which embedding backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "local")]
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "cloud" => Ok(Self::OpenAi),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(Error::Config(format!(
                "Unknown embedding provider '{other}'. Expected 'openai' or 'local'."
            ))),
        }
    }
}

/// Attempt budget and backoff curve for provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    ///
    /// A server-provided `Retry-After` wins over the exponential curve; both are
    /// capped at `max_delay`.
    pub fn backoff(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let delay = match retry_after_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max_delay)
    }
}

// OpenAI-compatible wire format

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiEmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingResponse {
    pub data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingData {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub index: Option<usize>,
}

// Local provider wire format

#[derive(Debug, Clone, Serialize)]
pub struct LocalEmbeddingRequest {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalEmbeddingResponse {
    pub embedding: Vec<f32>,
}
