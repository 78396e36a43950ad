//! In-process vector index
//!
//! Exact cosine search over stored combined embeddings. Each collection locks
//! its dimension on the first save.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::{cosine_similarity, validate_dimension};
use crate::error::Result;

use super::index::{SimilarityQuery, SimilarityScale, VectorIndex};
use super::record::{Collection, EmbeddingRecord, IndexHit};

/// Metadata key matched against the category hint
pub const CATEGORY_KEY: &str = "category";

#[derive(Debug, Default)]
struct CollectionData {
    dimension: Option<usize>,
    /// Keyed by (organization_id, id)
    records: HashMap<(String, String), EmbeddingRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<Collection, CollectionData>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection).await == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn similarity_scale(&self) -> SimilarityScale {
        SimilarityScale::Cosine
    }

    async fn save(&self, collection: Collection, record: &EmbeddingRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        let data = collections.entry(collection).or_default();

        let dimension = data
            .dimension
            .unwrap_or(record.combined_embedding.len());
        record.validate(dimension)?;
        data.dimension = Some(dimension);

        data.records.insert(
            (record.organization_id.clone(), record.id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<EmbeddingRecord>> {
        let collections = self.collections.read().await;
        Ok(collections.get(&collection).and_then(|data| {
            data.records
                .get(&(organization_id.to_string(), id.to_string()))
                .cloned()
        }))
    }

    async fn find_similar(
        &self,
        collection: Collection,
        query: &SimilarityQuery<'_>,
    ) -> Result<Vec<IndexHit>> {
        let collections = self.collections.read().await;
        let Some(data) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        if let Some(dimension) = data.dimension {
            validate_dimension(query.embedding, dimension)?;
        }

        let mut hits = Vec::new();
        for record in data.records.values() {
            if let Some(org) = query.organization_id {
                if record.organization_id != org {
                    continue;
                }
            }
            if let Some(category) = query.category {
                let matches = record
                    .metadata
                    .get(CATEGORY_KEY)
                    .is_some_and(|c| c.eq_ignore_ascii_case(category));
                if !matches {
                    continue;
                }
            }
            let similarity = cosine_similarity(query.embedding, &record.combined_embedding)?;
            hits.push(IndexHit {
                id: record.id.clone(),
                similarity,
                metadata: record.metadata.clone(),
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn delete(&self, collection: Collection, id: &str, organization_id: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(&collection)
            .and_then(|data| {
                data.records
                    .remove(&(organization_id.to_string(), id.to_string()))
            })
            .is_some())
    }
}
