//! Graphrag Core Library
//!
//! Retrieval over a knowledge graph of entities, relations and meeting-note
//! topics. The crate provides:
//! - Embedding generation (OpenAI-compatible and local providers, retry, fallback)
//! - Vector index access (HTTP client and an in-memory index)
//! - Heuristic scoring with query-adaptive weights
//! - Cross-type search orchestration with per-type degradation
//! - Token-budgeted context assembly with source attribution
//! - SQLite storage for the authoritative graph objects

pub mod config;
pub mod context;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod pipeline;
pub mod scoring;
pub mod search;
pub mod storage;
pub mod vector;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::{ContextAssembler, ContextResult, Source};
    pub use crate::domain::graph::{
        Entity, EntityType, FilterLogic, GraphStore, Relation, SearchFilters, Topic, TopicKey,
    };
    pub use crate::embedding::{EmbeddingProvider, EmbeddingService};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::KnowledgeGraphRag;
    pub use crate::scoring::{ScoringConfig, ScoringWeights};
    pub use crate::search::{SearchOrchestrator, SearchResult};
    pub use crate::vector::VectorIndex;
}
