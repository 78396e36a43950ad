//! Embedding generation
//!
//! - [`EmbeddingProvider`]: one HTTP attempt against a backend (OpenAI-compatible,
//!   local, or the offline [`SimpleEmbeddingProvider`])
//! - [`EmbeddingService`]: sanitization, retry with backoff, single cloud fallback,
//!   chunked or pooled batching, dimension validation
//! - [`text`]: markup stripping and enhanced/metadata embedding text
//! - [`similarity`]: cosine similarity and weighted combination

mod provider;
mod service;
pub mod similarity;
pub mod text;
pub mod types;

pub use provider::{
    EmbeddingProvider, LocalProvider, OpenAiProvider, OpenAiProviderBuilder,
    SimpleEmbeddingProvider,
};
pub use service::{EmbeddingService, EmbeddingServiceBuilder};
pub use similarity::{combine_weighted_embeddings, cosine_similarity, validate_dimension};
pub use text::{EmbeddingMetadata, sanitize_text};
pub use types::{ProviderKind, RetryPolicy};
