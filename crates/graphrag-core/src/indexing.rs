//! Embedding upsert of graph objects
//!
//! Builds the embedding text for each object kind, embeds it, and stores an
//! [`EmbeddingRecord`] with denormalised display fields so search can fall back
//! to index metadata when the graph store lags behind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::graph::{Entity, GraphStore, Relation, Topic};
use crate::embedding::EmbeddingService;
use crate::embedding::text::EmbeddingMetadata;
use crate::error::{Error, Result};
use crate::vector::{CATEGORY_KEY, Collection, EmbeddingRecord, VectorIndex};

const NAME_REPEAT: usize = 3;

/// Outcome of indexing every object of one kind in an organization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: usize,
}

/// Name repeated, then aliases, then labelled metadata fields
pub fn entity_text(entity: &Entity) -> String {
    let mut text = vec![entity.name.as_str(); NAME_REPEAT].join("\n");
    if !entity.aliases.is_empty() {
        text.push_str("\n\nAliases: ");
        text.push_str(&entity.aliases.join(", "));
    }
    if let Some(metadata) = entity_metadata_text(entity) {
        text.push_str("\n\n");
        text.push_str(&metadata);
    }
    text.trim().to_string()
}

fn entity_metadata_text(entity: &Entity) -> Option<String> {
    let parts: Vec<String> = entity
        .metadata
        .known_fields()
        .into_iter()
        .filter(|(field, _)| *field != "url")
        .map(|(field, value)| format!("{field}: {value}"))
        .chain(
            entity
                .metadata
                .extra
                .iter()
                .map(|(key, value)| format!("{key}: {value}")),
        )
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Relation type repeated, then endpoints, description and metadata
pub fn relation_text(relation: &Relation, source_name: Option<&str>, target_name: Option<&str>) -> String {
    let mut parts = vec![relation.relation_type.clone(); NAME_REPEAT];
    match (source_name, target_name) {
        (Some(source), Some(target)) => parts.push(format!("relation between {source} and {target}")),
        (Some(name), None) | (None, Some(name)) => parts.push(format!("related to {name}")),
        (None, None) => {}
    }
    if let Some(description) = relation.description.as_deref().filter(|d| !d.trim().is_empty()) {
        parts.push(description.to_string());
    }

    let mut metadata: Vec<String> = Vec::new();
    if let Some(strength) = relation.metadata.strength {
        metadata.push(format!("strength: {strength}"));
    }
    if let Some(direction) = &relation.metadata.direction {
        metadata.push(format!("direction: {direction}"));
    }
    metadata.extend(
        relation
            .metadata
            .extra
            .iter()
            .map(|(key, value)| format!("{key}: {value}")),
    );
    if !metadata.is_empty() {
        parts.push(metadata.join(", "));
    }
    parts.join("\n\n")
}

fn topic_metadata(topic: &Topic) -> EmbeddingMetadata<'_> {
    EmbeddingMetadata {
        semantic_category: topic.semantic_category.as_deref(),
        keywords: &topic.keywords,
        tags: &topic.tags,
        summary: topic.summary.as_deref(),
    }
}

/// Writes embedding records for graph objects into a vector index
#[derive(Clone)]
pub struct EmbeddingIndexer {
    embeddings: EmbeddingService,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn GraphStore>,
}

impl std::fmt::Debug for EmbeddingIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndexer")
            .field("embeddings", &self.embeddings)
            .finish_non_exhaustive()
    }
}

impl EmbeddingIndexer {
    pub fn new(
        embeddings: EmbeddingService,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            embeddings,
            index,
            store,
        }
    }

    fn record(&self, id: &str, organization_id: &str, combined: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord::new(id, organization_id, combined, self.embeddings.model())
            .with_metadata("organization_id", organization_id)
    }

    async fn save(&self, collection: Collection, record: EmbeddingRecord) -> Result<EmbeddingRecord> {
        record.validate(self.embeddings.dimension())?;
        self.index.save(collection, &record).await?;
        debug!(collection = %collection, id = %record.id, "Embedding record saved");
        Ok(record)
    }

    /// Optional extra vectors: failures other than contract violations are dropped
    fn optional(kind: &str, id: &str, outcome: Result<Vec<f32>>) -> Result<Option<Vec<f32>>> {
        match outcome {
            Ok(vector) => Ok(Some(vector)),
            Err(Error::EmptyInput) => Ok(None),
            Err(e) if e.is_contract_violation() => Err(e),
            Err(e) => {
                warn!(kind, id, error = %e, "Auxiliary embedding failed; continuing");
                Ok(None)
            }
        }
    }

    pub async fn index_entity(&self, entity: &Entity) -> Result<EmbeddingRecord> {
        let combined = self.embeddings.generate_embedding(&entity_text(entity)).await?;
        let name = Self::optional(
            "entity",
            &entity.id,
            self.embeddings.generate_embedding(&entity.name).await,
        )?;
        let metadata = match entity_metadata_text(entity) {
            Some(summary) => {
                let meta = EmbeddingMetadata {
                    semantic_category: Some(entity.entity_type.as_str()),
                    keywords: &entity.aliases,
                    tags: &[],
                    summary: Some(&summary),
                };
                Self::optional(
                    "entity",
                    &entity.id,
                    self.embeddings.generate_metadata_embedding(&meta).await,
                )?
            }
            None => None,
        };

        let mut record = self
            .record(&entity.id, &entity.organization_id, combined)
            .with_metadata("name", &entity.name)
            .with_metadata("entity_type", entity.entity_type.as_str())
            .with_metadata(CATEGORY_KEY, entity.entity_type.as_str());
        record.name_embedding = name;
        record.metadata_embedding = metadata;
        self.save(Collection::Entities, record).await
    }

    /// Endpoint names come from the graph store; missing entities use raw ids
    pub async fn index_relation(&self, relation: &Relation) -> Result<EmbeddingRecord> {
        let ids: Vec<String> = relation.endpoint_ids().map(str::to_string).collect();
        let entities = if ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .get_entities_by_ids(&ids)
                .await
                .unwrap_or_else(|e| {
                    warn!(relation_id = %relation.id, error = %e, "Endpoint lookup failed; using raw ids");
                    Vec::new()
                })
        };
        let name_of = |id: Option<&String>| {
            id.map(|id| {
                entities
                    .iter()
                    .find(|e| &e.id == id)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| id.clone())
            })
        };
        let source_name = name_of(relation.source_entity_id.as_ref());
        let target_name = name_of(relation.target_entity_id.as_ref());

        let text = relation_text(relation, source_name.as_deref(), target_name.as_deref());
        let combined = self.embeddings.generate_embedding(&text).await?;
        let name = Self::optional(
            "relation",
            &relation.id,
            self.embeddings.generate_embedding(&relation.relation_type).await,
        )?;

        let mut record = self
            .record(&relation.id, &relation.organization_id, combined)
            .with_metadata("relation_type", &relation.relation_type)
            .with_metadata(CATEGORY_KEY, &relation.relation_type)
            .with_metadata("source_entity_id", relation.source_entity_id.clone().unwrap_or_default())
            .with_metadata("target_entity_id", relation.target_entity_id.clone().unwrap_or_default())
            .with_metadata("description", relation.description.clone().unwrap_or_default());
        record.name_embedding = name;
        self.save(Collection::Relations, record).await
    }

    /// Stored under `{meeting_note_id}-topic-{topic_id}`
    pub async fn index_topic(&self, topic: &Topic) -> Result<EmbeddingRecord> {
        let metadata = topic_metadata(topic);
        let combined = self
            .embeddings
            .generate_enhanced_embedding(&topic.title, &topic.content, &metadata)
            .await?;
        let metadata_embedding = Self::optional(
            "topic",
            &topic.topic_id,
            self.embeddings.generate_metadata_embedding(&metadata).await,
        )?;
        let title_embedding = Self::optional(
            "topic",
            &topic.topic_id,
            self.embeddings.generate_embedding(&topic.title).await,
        )?;

        let key = topic.key();
        let mut record = self
            .record(&key.record_id(), &topic.organization_id, combined)
            .with_metadata("topic_id", &topic.topic_id)
            .with_metadata("meeting_note_id", &topic.meeting_note_id)
            .with_metadata("title", &topic.title)
            .with_metadata("content_summary", topic.content_summary())
            .with_metadata("semantic_category", topic.semantic_category.clone().unwrap_or_default())
            .with_metadata(CATEGORY_KEY, topic.semantic_category.clone().unwrap_or_default())
            .with_metadata("keywords", topic.keywords.join(","));
        record.name_embedding = title_embedding;
        record.metadata_embedding = metadata_embedding;
        self.save(Collection::Topics, record).await
    }

    /// Index every stored object of `collection` for one organization.
    ///
    /// Per-object failures are counted and logged; a dimension mismatch aborts.
    pub async fn index_organization(
        &self,
        collection: Collection,
        organization_id: &str,
    ) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let outcomes: Vec<(String, Result<EmbeddingRecord>)> = match collection {
            Collection::Entities => {
                let mut out = Vec::new();
                for entity in self.store.list_entities(organization_id).await? {
                    out.push((entity.id.clone(), self.index_entity(&entity).await));
                }
                out
            }
            Collection::Relations => {
                let mut out = Vec::new();
                for relation in self.store.list_relations(organization_id).await? {
                    out.push((relation.id.clone(), self.index_relation(&relation).await));
                }
                out
            }
            Collection::Topics => {
                let mut out = Vec::new();
                for topic in self.store.list_topics(organization_id).await? {
                    out.push((topic.key().record_id(), self.index_topic(&topic).await));
                }
                out
            }
        };

        for (id, outcome) in outcomes {
            match outcome {
                Ok(_) => report.indexed += 1,
                Err(e @ Error::DimensionMismatch { .. }) => return Err(e),
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "Failed to index object");
                    report.failed += 1;
                }
            }
        }

        info!(
            collection = %collection,
            organization_id,
            indexed = report.indexed,
            failed = report.failed,
            "Indexing finished"
        );
        Ok(report)
    }

    pub async fn delete(&self, collection: Collection, id: &str, organization_id: &str) -> Result<bool> {
        let removed = self.index.delete(collection, id, organization_id).await?;
        debug!(collection = %collection, id, removed, "Embedding record deleted");
        Ok(removed)
    }
}
