//! Embedding service: sanitization, retry, fallback and batching on top of a provider

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::config::ResolvedEmbeddingConfig;
use crate::error::{Error, Result};

use super::provider::{EmbeddingProvider, LocalProvider, OpenAiProvider};
use super::similarity::validate_dimension;
use super::text::{EmbeddingMetadata, build_enhanced_text, build_metadata_text, sanitize_text};
use super::types::{DEFAULT_DIMENSION, DEFAULT_EMBEDDING_CONCURRENCY, ProviderKind, RetryPolicy};

/// Converts text into fixed-dimension vectors
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    fallback: Option<Arc<dyn EmbeddingProvider>>,
    retry: RetryPolicy,
    dimension: usize,
    batch_size: usize,
    batch_pause: Duration,
    concurrency: usize,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name().to_string()))
            .field("dimension", &self.dimension)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for creating an EmbeddingService
pub struct EmbeddingServiceBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    fallback: Option<Arc<dyn EmbeddingProvider>>,
    retry: Option<RetryPolicy>,
    dimension: Option<usize>,
    batch_size: Option<usize>,
    batch_pause: Option<Duration>,
    concurrency: Option<usize>,
}

impl EmbeddingServiceBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            fallback: None,
            retry: None,
            dimension: None,
            batch_size: None,
            batch_pause: None,
            concurrency: None,
        }
    }

    /// Provider tried once after the primary exhausts its retries
    pub fn fallback(mut self, fallback: Arc<dyn EmbeddingProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Texts per batch request (defaults to the provider's preference)
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = Some(pause);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn build(self) -> Result<EmbeddingService> {
        let dimension = self.dimension.unwrap_or(DEFAULT_DIMENSION);
        if dimension == 0 {
            return Err(Error::Config("embedding dimension must be positive".to_string()));
        }
        let batch_size = self
            .batch_size
            .unwrap_or_else(|| self.provider.default_batch_size())
            .max(1);

        Ok(EmbeddingService {
            provider: self.provider,
            fallback: self.fallback,
            retry: self.retry.unwrap_or_default(),
            dimension,
            batch_size,
            batch_pause: self.batch_pause.unwrap_or(Duration::from_millis(100)),
            concurrency: self
                .concurrency
                .unwrap_or(DEFAULT_EMBEDDING_CONCURRENCY)
                .max(1),
        })
    }
}

impl EmbeddingService {
    pub fn builder(provider: Arc<dyn EmbeddingProvider>) -> EmbeddingServiceBuilder {
        EmbeddingServiceBuilder::new(provider)
    }

    /// Build providers from a resolved configuration
    pub fn from_config(config: &ResolvedEmbeddingConfig) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match config.provider {
            ProviderKind::OpenAi => Arc::new(
                OpenAiProvider::builder()
                    .api_key(config.api_key.clone().unwrap_or_default())
                    .url(&config.api_url)
                    .model(&config.model)
                    .timeout(config.timeout)
                    .build()?,
            ),
            ProviderKind::Local => Arc::new(LocalProvider::new(
                &config.api_url,
                &config.model,
                config.timeout,
            )?),
        };

        let mut builder = Self::builder(provider)
            .retry(config.retry)
            .dimension(config.dimension)
            .batch_pause(config.batch_pause);

        if let Some(fallback) = &config.fallback {
            let cloud = OpenAiProvider::builder()
                .api_key(&fallback.api_key)
                .url(&fallback.api_url)
                .model(&fallback.model)
                .timeout(config.timeout)
                .build()?;
            builder = builder.fallback(Arc::new(cloud));
        }

        let service = builder.build()?;
        info!(
            provider = %service.provider.name(),
            model = %service.provider.model(),
            dimension = service.dimension,
            fallback = service.fallback.is_some(),
            "Embedding service configured"
        );
        Ok(service)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embed one text.
    ///
    /// Fails with `EmptyInput` when nothing is left after sanitization and with
    /// `DimensionMismatch` when the provider returns a wrongly sized vector.
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let clean = sanitize_text(text);
        if clean.is_empty() {
            return Err(Error::EmptyInput);
        }
        self.embed_clean(&clean).await
    }

    /// Embed many texts; the output is index-aligned with the input.
    ///
    /// Texts that sanitize to nothing and chunks that fail after retries yield
    /// empty vectors. Contract violations still abort the whole call.
    pub async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cleaned: Vec<String> = texts.iter().map(|t| sanitize_text(t)).collect();
        let pending: Vec<usize> = (0..cleaned.len())
            .filter(|&i| !cleaned[i].is_empty())
            .collect();
        let mut out: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];

        if pending.is_empty() {
            return Ok(out);
        }

        if self.provider.supports_batch() {
            self.embed_chunked(&cleaned, &pending, &mut out).await?;
        } else {
            self.embed_pooled(&cleaned, &pending, &mut out).await?;
        }

        let failed = pending.iter().filter(|&&i| out[i].is_empty()).count();
        debug!(
            total = texts.len(),
            embedded = pending.len() - failed,
            failed,
            "Batch embedding finished"
        );
        Ok(out)
    }

    /// Title-weighted text with folded-in metadata
    pub async fn generate_enhanced_embedding(
        &self,
        title: &str,
        content: &str,
        metadata: &EmbeddingMetadata<'_>,
    ) -> Result<Vec<f32>> {
        let content = sanitize_text(content);
        self.generate_embedding(&build_enhanced_text(title, &content, metadata))
            .await
    }

    /// Embedding of the metadata alone; `EmptyInput` when there is none
    pub async fn generate_metadata_embedding(
        &self,
        metadata: &EmbeddingMetadata<'_>,
    ) -> Result<Vec<f32>> {
        let text = build_metadata_text(metadata).ok_or(Error::EmptyInput)?;
        self.generate_embedding(&text).await
    }

    async fn embed_clean(&self, text: &str) -> Result<Vec<f32>> {
        let primary = self
            .with_retry(self.provider.name(), || self.provider.embed(text))
            .await;

        let err = match primary {
            Ok(vector) => {
                validate_dimension(&vector, self.dimension)?;
                return Ok(vector);
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(err);
        };

        warn!(
            provider = %self.provider.name(),
            fallback = %fallback.name(),
            error = %err,
            "Embedding provider exhausted, trying fallback once"
        );

        match fallback.embed(text).await {
            Ok(vector) => {
                validate_dimension(&vector, self.dimension)?;
                info!(fallback = %fallback.name(), "Fallback embedding succeeded");
                Ok(vector)
            }
            Err(fallback_err) => {
                warn!(
                    fallback = %fallback.name(),
                    error = %fallback_err,
                    "Fallback embedding failed, surfacing original error"
                );
                Err(err)
            }
        }
    }

    async fn embed_chunked(
        &self,
        cleaned: &[String],
        pending: &[usize],
        out: &mut [Vec<f32>],
    ) -> Result<()> {
        let chunks: Vec<&[usize]> = pending.chunks(self.batch_size).collect();
        let last = chunks.len().saturating_sub(1);

        for (n, chunk) in chunks.into_iter().enumerate() {
            let inputs: Vec<String> = chunk.iter().map(|&i| cleaned[i].clone()).collect();

            match self
                .with_retry(self.provider.name(), || self.provider.embed_batch(&inputs))
                .await
            {
                Ok(vectors) => {
                    for (&i, vector) in chunk.iter().zip(vectors) {
                        validate_dimension(&vector, self.dimension)?;
                        out[i] = vector;
                    }
                }
                Err(e) if e.is_contract_violation() => return Err(e),
                Err(e) => {
                    warn!(
                        chunk = n,
                        size = chunk.len(),
                        error = %e,
                        "Embedding chunk failed, recording empty vectors"
                    );
                }
            }

            if n < last && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }
        Ok(())
    }

    async fn embed_pooled(
        &self,
        cleaned: &[String],
        pending: &[usize],
        out: &mut [Vec<f32>],
    ) -> Result<()> {
        let results: Vec<(usize, Result<Vec<f32>>)> = stream::iter(pending.iter().copied())
            .map(|i| async move { (i, self.embed_clean(&cleaned[i]).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (i, result) in results {
            match result {
                Ok(vector) => out[i] = vector,
                Err(e) if e.is_contract_violation() => return Err(e),
                Err(e) => {
                    warn!(index = i, error = %e, "Embedding failed, recording empty vector");
                }
            }
        }
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, provider: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.retries => {
                    let retry_after = match &e {
                        Error::RateLimited {
                            retry_after_secs, ..
                        } => *retry_after_secs,
                        _ => None,
                    };
                    let delay = self.retry.backoff(attempt, retry_after);
                    warn!(
                        provider,
                        attempt = attempt + 1,
                        wait_ms = delay.as_millis() as u64,
                        error = %e,
                        "Embedding request failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::SimpleEmbeddingProvider;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted outcomes, then answers with a fixed vector
    struct ScriptedProvider {
        name: &'static str,
        batch: bool,
        script: Mutex<VecDeque<Result<Vec<f32>>>>,
        calls: AtomicUsize,
        answer: Vec<f32>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, script: Vec<Result<Vec<f32>>>) -> Self {
            Self {
                name,
                batch: false,
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                answer: vec![0.5; 4],
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn supports_batch(&self) -> bool {
            self.batch
        }

        fn default_batch_size(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("boom") {
                return Err(unavailable(self.name));
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.answer.clone()))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("boom")) {
                return Err(Error::ProviderResponse {
                    provider: self.name.to_string(),
                    status: Some(400),
                    message: "bad chunk".into(),
                });
            }
            Ok(texts.iter().map(|_| self.answer.clone()).collect())
        }
    }

    fn unavailable(provider: &str) -> Error {
        Error::ProviderUnavailable {
            provider: provider.to_string(),
            status: 500,
            message: "down".into(),
        }
    }

    fn fast_retry(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn service(provider: Arc<ScriptedProvider>, retries: u32) -> EmbeddingService {
        EmbeddingService::builder(provider)
            .retry(fast_retry(retries))
            .dimension(4)
            .batch_pause(Duration::ZERO)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new("local", vec![]));
        let svc = service(provider.clone(), 3);

        let err = svc.generate_embedding("  <p> </p> ").await.unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let provider = Arc::new(ScriptedProvider::new(
            "local",
            vec![Err(unavailable("local")), Err(unavailable("local"))],
        ));
        let svc = service(provider.clone(), 3);

        let vector = svc.generate_embedding("hello").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let provider = Arc::new(ScriptedProvider::new(
            "openai",
            vec![Err(Error::ProviderResponse {
                provider: "openai".into(),
                status: Some(401),
                message: "unauthorized".into(),
            })],
        ));
        let svc = service(provider.clone(), 3);

        let err = svc.generate_embedding("hello").await.unwrap_err();
        assert_eq!(err.code(), "E100");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_surfaces() {
        let limited = || {
            Err(Error::RateLimited {
                provider: "openai".into(),
                retry_after_secs: None,
            })
        };
        let provider = Arc::new(ScriptedProvider::new(
            "openai",
            vec![limited(), limited(), limited()],
        ));
        let svc = service(provider.clone(), 2);

        let err = svc.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_propagates() {
        let provider = Arc::new(ScriptedProvider::new("local", vec![Ok(vec![1.0; 3])]));
        let svc = service(provider, 0);

        let err = svc.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_fallback_called_exactly_once() {
        let local = Arc::new(ScriptedProvider::new(
            "local",
            vec![Err(unavailable("local")), Err(unavailable("local"))],
        ));
        let cloud = Arc::new(ScriptedProvider::new("openai", vec![]));
        let svc = EmbeddingService::builder(local.clone())
            .fallback(cloud.clone())
            .retry(fast_retry(1))
            .dimension(4)
            .build()
            .unwrap();

        let vector = svc.generate_embedding("hello").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(local.calls(), 2);
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_surfaces_original_error() {
        let local = Arc::new(ScriptedProvider::new(
            "local",
            vec![Err(unavailable("local")), Err(unavailable("local"))],
        ));
        let cloud = Arc::new(ScriptedProvider::new(
            "openai",
            vec![Err(unavailable("openai")), Err(unavailable("openai"))],
        ));
        let svc = EmbeddingService::builder(local.clone())
            .fallback(cloud.clone())
            .retry(fast_retry(1))
            .dimension(4)
            .build()
            .unwrap();

        let err = svc.generate_embedding("hello").await.unwrap_err();
        match err {
            Error::ProviderUnavailable { provider, .. } => assert_eq!(provider, "local"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_preserves_length_and_empty_slots() {
        let svc = EmbeddingService::builder(Arc::new(SimpleEmbeddingProvider::new(8)))
            .dimension(8)
            .batch_size(2)
            .batch_pause(Duration::ZERO)
            .build()
            .unwrap();

        let texts: Vec<String> = vec!["alpha".into(), "<br>".into(), "beta".into(), "gamma".into()];
        let out = svc.generate_batch_embeddings(&texts).await.unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].len(), 8);
        assert!(out[1].is_empty());
        assert_eq!(out[2].len(), 8);
        assert_eq!(out[3].len(), 8);
    }

    #[tokio::test]
    async fn test_batch_failed_chunk_yields_empty_vectors() {
        let mut provider = ScriptedProvider::new("openai", vec![]);
        provider.batch = true;
        let provider = Arc::new(provider);
        let svc = service(provider.clone(), 0);

        let texts: Vec<String> = vec!["a".into(), "b".into(), "boom".into(), "c".into(), "d".into()];
        let out = svc.generate_batch_embeddings(&texts).await.unwrap();

        assert_eq!(out.len(), 5);
        assert_eq!(out[0].len(), 4);
        assert_eq!(out[1].len(), 4);
        assert!(out[2].is_empty());
        assert!(out[3].is_empty());
        assert_eq!(out[4].len(), 4);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_pooled_batch_for_non_batch_provider() {
        let provider = Arc::new(ScriptedProvider::new("local", vec![]));
        let svc = service(provider.clone(), 0);

        let texts: Vec<String> = (0..7).map(|i| format!("text {i}")).chain(["boom".to_string()]).collect();
        let out = svc.generate_batch_embeddings(&texts).await.unwrap();

        assert_eq!(out.len(), 8);
        assert!(out[..7].iter().all(|v| v.len() == 4));
        assert!(out[7].is_empty());
        assert_eq!(provider.calls(), 8);
    }

    #[tokio::test]
    async fn test_batch_dimension_mismatch_propagates() {
        let svc = EmbeddingService::builder(Arc::new(SimpleEmbeddingProvider::new(8)))
            .dimension(16)
            .build()
            .unwrap();

        let err = svc
            .generate_batch_embeddings(&["alpha".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[tokio::test]
    async fn test_metadata_embedding_requires_metadata() {
        let svc = EmbeddingService::builder(Arc::new(SimpleEmbeddingProvider::new(8)))
            .dimension(8)
            .build()
            .unwrap();

        let err = svc
            .generate_metadata_embedding(&EmbeddingMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput));

        let keywords = vec!["roadmap".to_string()];
        let vector = svc
            .generate_metadata_embedding(&EmbeddingMetadata {
                keywords: &keywords,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(vector.len(), 8);
    }
}
