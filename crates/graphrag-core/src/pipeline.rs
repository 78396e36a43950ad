//! End-to-end retrieval facade
//!
//! Wires the embedding service, vector index and graph store into a
//! [`SearchOrchestrator`] and renders its results with a [`ContextAssembler`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::{Config, ResolvedEmbeddingConfig};
use crate::context::{ContextAssembler, ContextResult};
use crate::domain::graph::{GraphStore, SearchFilters};
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::search::{SearchOrchestrator, SearchResult};
use crate::vector::{HttpVectorIndex, VectorIndex};

#[derive(Debug, Clone)]
pub struct KnowledgeGraphRag {
    orchestrator: SearchOrchestrator,
    assembler: ContextAssembler,
}

impl KnowledgeGraphRag {
    pub fn new(orchestrator: SearchOrchestrator, assembler: ContextAssembler) -> Self {
        Self {
            orchestrator,
            assembler,
        }
    }

    /// Build from explicit parts with the scoring and search settings of `config`
    pub fn from_parts(
        config: &Config,
        embeddings: EmbeddingService,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn GraphStore>,
    ) -> Result<Self> {
        let mut builder =
            SearchOrchestrator::builder(embeddings, index, store).scoring(config.scoring.clone());
        if let Some(ms) = config.search.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(Self::new(builder.build()?, ContextAssembler::new()))
    }

    /// Build against the HTTP vector index named in `config`
    pub fn from_config(
        config: &Config,
        embedding: &ResolvedEmbeddingConfig,
        store: Arc<dyn GraphStore>,
    ) -> Result<Self> {
        let embeddings = EmbeddingService::from_config(embedding)?;
        let index = HttpVectorIndex::builder()
            .base_url(&config.vector_index.url)
            .timeout(Duration::from_secs(config.vector_index.timeout_secs))
            .build()?;
        Self::from_parts(config, embeddings, Arc::new(index), store)
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        self.orchestrator.search(query, limit, filters).await
    }

    /// Search and render a context block for a language model prompt.
    ///
    /// Never fails: any error is logged and yields an empty context.
    pub async fn retrieve_context(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        max_tokens: usize,
    ) -> ContextResult {
        match self.orchestrator.search(query, limit, filters).await {
            Ok(results) => {
                let context = self.assembler.build_context(&results, max_tokens);
                info!(
                    results = results.len(),
                    sources = context.sources.len(),
                    truncated = context.truncated,
                    "Knowledge graph context assembled"
                );
                context
            }
            Err(e) => {
                error!(error = %e, "Knowledge graph retrieval failed; returning empty context");
                ContextResult::default()
            }
        }
    }
}
