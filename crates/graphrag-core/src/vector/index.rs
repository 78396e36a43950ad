//! Vector index trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::record::{Collection, EmbeddingRecord, IndexHit};

/// Range and direction of the raw scores an index returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityScale {
    /// Already in [0, 1], higher is better
    #[default]
    Unit,
    /// Cosine similarity in [-1, 1]
    Cosine,
    /// Cosine distance in [0, 2], lower is better
    Distance,
}

/// Parameters of a nearest-neighbour query
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityQuery<'a> {
    pub embedding: &'a [f32],
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<&'a str>,
    /// Coarse category hint; exact filtering happens after hydration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'a str>,
}

impl<'a> SimilarityQuery<'a> {
    pub fn new(embedding: &'a [f32], limit: usize) -> Self {
        Self {
            embedding,
            limit,
            organization_id: None,
            category: None,
        }
    }

    pub fn organization(mut self, organization_id: Option<&'a str>) -> Self {
        self.organization_id = organization_id;
        self
    }

    pub fn category(mut self, category: Option<&'a str>) -> Self {
        self.category = category;
        self
    }
}

/// Out-of-process nearest-neighbour service, one collection per object kind
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Scale of `IndexHit::similarity`
    fn similarity_scale(&self) -> SimilarityScale;

    /// Insert or replace a record
    async fn save(&self, collection: Collection, record: &EmbeddingRecord) -> Result<()>;

    /// Fetch a record; `Ok(None)` when absent
    async fn get(
        &self,
        collection: Collection,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<EmbeddingRecord>>;

    /// Hits ordered by descending similarity
    async fn find_similar(
        &self,
        collection: Collection,
        query: &SimilarityQuery<'_>,
    ) -> Result<Vec<IndexHit>>;

    /// Remove a record; `Ok(false)` when it did not exist
    async fn delete(&self, collection: Collection, id: &str, organization_id: &str) -> Result<bool>;
}
