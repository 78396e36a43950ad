//! Cross-type search
//!
//! The query is embedded once, then entities, relations and topics are
//! searched concurrently. Each per-type search over-fetches from the vector
//! index, hydrates the hits from the graph store in batches, applies the hard
//! filters, scores and keeps its quota. A failing type is logged and
//! contributes nothing; the others still return.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::graph::{Entity, GraphStore, SearchFilters, Topic, TopicKey, TopicSummary};
use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::scoring::{QueryContext, ScoringConfig, ScoringEngine, TopicSignals};
use crate::vector::{CATEGORY_KEY, Collection, IndexHit, SimilarityQuery, VectorIndex};

use super::result::{
    RelationHit, ResultKind, ResultPayload, SearchResult, merge_results, per_type_quota,
    rank_and_truncate,
};

/// Index candidates requested per result slot, slack for post-filter losses
pub const OVERFETCH_FACTOR: usize = 2;
/// Ids per batched store lookup
pub const HYDRATION_CHUNK_SIZE: usize = 200;
/// Batched store lookups in flight per search
pub const HYDRATION_CONCURRENCY: usize = 4;

/// Runs searches against one vector index and one graph store
#[derive(Clone)]
pub struct SearchOrchestrator {
    embeddings: EmbeddingService,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn GraphStore>,
    scoring: ScoringEngine,
    timeout: Option<Duration>,
    track_topic_usage: bool,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("embeddings", &self.embeddings)
            .field("scoring", &self.scoring)
            .field("timeout", &self.timeout)
            .field("track_topic_usage", &self.track_topic_usage)
            .finish_non_exhaustive()
    }
}

/// Builder for creating a SearchOrchestrator
pub struct SearchOrchestratorBuilder {
    embeddings: EmbeddingService,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn GraphStore>,
    scoring: Option<ScoringConfig>,
    timeout: Option<Duration>,
    track_topic_usage: bool,
}

impl SearchOrchestratorBuilder {
    pub fn new(
        embeddings: EmbeddingService,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            embeddings,
            index,
            store,
            scoring: None,
            timeout: None,
            track_topic_usage: false,
        }
    }

    pub fn scoring(mut self, config: ScoringConfig) -> Self {
        self.scoring = Some(config);
        self
    }

    /// Overall deadline for the per-type searches of one query
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bump `search_count` of topics returned by [`SearchOrchestrator::search`]
    pub fn track_topic_usage(mut self, enabled: bool) -> Self {
        self.track_topic_usage = enabled;
        self
    }

    pub fn build(self) -> Result<SearchOrchestrator> {
        let config = self.scoring.unwrap_or_default();
        config.validate()?;
        let scale = self.index.similarity_scale();

        Ok(SearchOrchestrator {
            embeddings: self.embeddings,
            index: self.index,
            store: self.store,
            scoring: ScoringEngine::new(config, scale),
            timeout: self.timeout,
            track_topic_usage: self.track_topic_usage,
        })
    }
}

impl SearchOrchestrator {
    pub fn builder(
        embeddings: EmbeddingService,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn GraphStore>,
    ) -> SearchOrchestratorBuilder {
        SearchOrchestratorBuilder::new(embeddings, index, store)
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    /// Ranked matches across all three kinds.
    ///
    /// Each kind keeps at most `ceil(limit / 3)` results before the merge, and
    /// the merged list holds at most `limit`. Failures of a single kind and
    /// embedding failures degrade to fewer results; only contract violations
    /// (a wrongly sized vector) are returned as errors. The timeout, when set,
    /// covers the query embedding as well.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let deadline = self.deadline();
        let Some(embedding) = self.embed_query(query, limit, deadline).await? else {
            return Ok(Vec::new());
        };

        let quota = per_type_quota(limit);
        let ctx = self.scoring.query_context(query, filters, Utc::now());

        let (entities, relations, topics) = tokio::join!(
            self.bounded(deadline, ResultKind::Entity, self.entity_results(&embedding, quota, &ctx)),
            self.bounded(deadline, ResultKind::Relation, self.relation_results(&embedding, quota, &ctx)),
            self.bounded(deadline, ResultKind::Topic, self.topic_results(&embedding, quota, &ctx)),
        );

        let mut lists = Vec::with_capacity(3);
        let mut violation = None;
        for (kind, outcome) in [
            (ResultKind::Entity, entities),
            (ResultKind::Relation, relations),
            (ResultKind::Topic, topics),
        ] {
            match outcome {
                Ok(list) => lists.push(list),
                Err(e) if e.is_contract_violation() => {
                    violation.get_or_insert(e);
                }
                Err(e) => warn!(kind = %kind, error = %e, "Search degraded; skipping result type"),
            }
        }
        if let Some(e) = violation {
            return Err(e);
        }

        let results = merge_results(lists, limit);
        info!(
            query_len = query.len(),
            limit,
            quota,
            results = results.len(),
            "Knowledge graph search complete"
        );
        self.record_topic_usage(&results).await;
        Ok(results)
    }

    /// Entity matches only, up to `limit`
    pub async fn search_entities(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let deadline = self.deadline();
        let Some(embedding) = self.embed_query(query, limit, deadline).await? else {
            return Ok(Vec::new());
        };
        let ctx = self.scoring.query_context(query, filters, Utc::now());
        self.bounded(
            deadline,
            ResultKind::Entity,
            self.entity_results(&embedding, limit, &ctx),
        )
        .await
    }

    /// Relation matches only, up to `limit`
    pub async fn search_relations(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let deadline = self.deadline();
        let Some(embedding) = self.embed_query(query, limit, deadline).await? else {
            return Ok(Vec::new());
        };
        let ctx = self.scoring.query_context(query, filters, Utc::now());
        self.bounded(
            deadline,
            ResultKind::Relation,
            self.relation_results(&embedding, limit, &ctx),
        )
        .await
    }

    /// Topic matches only, up to `limit`
    pub async fn search_topics(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let deadline = self.deadline();
        let Some(embedding) = self.embed_query(query, limit, deadline).await? else {
            return Ok(Vec::new());
        };
        let ctx = self.scoring.query_context(query, filters, Utc::now());
        self.bounded(
            deadline,
            ResultKind::Topic,
            self.topic_results(&embedding, limit, &ctx),
        )
        .await
    }

    /// Entities among the cross-type results
    pub async fn find_related_entities(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<Entity>> {
        let results = self.search(query, limit, filters).await?;
        Ok(results
            .into_iter()
            .filter_map(|r| match r.payload {
                ResultPayload::Entity(entity) => Some(entity),
                _ => None,
            })
            .take(limit)
            .collect())
    }

    /// Relations among the cross-type results
    pub async fn find_related_relations(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<RelationHit>> {
        let results = self.search(query, limit, filters).await?;
        Ok(results
            .into_iter()
            .filter_map(|r| match r.payload {
                ResultPayload::Relation(hit) => Some(hit),
                _ => None,
            })
            .take(limit)
            .collect())
    }

    /// `Ok(None)` means "nothing to search": blank query, zero limit, or an
    /// embedding failure that was logged
    /// One deadline per search, shared by the query embedding and every kind
    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }

    async fn embed_query(
        &self,
        query: &str,
        limit: usize,
        deadline: Option<Instant>,
    ) -> Result<Option<Vec<f32>>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(None);
        }
        let embedding = self.embeddings.generate_embedding(query);
        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, embedding).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        timeout_ms = self.timeout.unwrap_or_default().as_millis() as u64,
                        "Query embedding timed out; returning no results"
                    );
                    return Ok(None);
                }
            },
            None => embedding.await,
        };
        match outcome {
            Ok(embedding) => Ok(Some(embedding)),
            Err(Error::EmptyInput) => Ok(None),
            Err(e) if e.is_contract_violation() => Err(e),
            Err(e) => {
                warn!(error = %e, "Query embedding failed; returning no results");
                Ok(None)
            }
        }
    }

    async fn bounded<F>(
        &self,
        deadline: Option<Instant>,
        kind: ResultKind,
        search: F,
    ) -> Result<Vec<SearchResult>>
    where
        F: Future<Output = Result<Vec<SearchResult>>>,
    {
        let Some(deadline) = deadline else {
            return search.await;
        };
        match tokio::time::timeout_at(deadline, search).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("{kind} search"),
                self.timeout.unwrap_or_default(),
            )),
        }
    }

    async fn candidates(
        &self,
        collection: Collection,
        embedding: &[f32],
        quota: usize,
        filters: &SearchFilters,
        category: Option<&str>,
    ) -> Result<Vec<IndexHit>> {
        let query = SimilarityQuery::new(embedding, quota.saturating_mul(OVERFETCH_FACTOR))
            .organization(filters.organization_id.as_deref())
            .category(category);
        let hits = self.index.find_similar(collection, &query).await?;
        debug!(collection = %collection, hits = hits.len(), "Vector candidates");
        Ok(hits)
    }

    async fn entity_results(
        &self,
        embedding: &[f32],
        quota: usize,
        ctx: &QueryContext<'_>,
    ) -> Result<Vec<SearchResult>> {
        let filters = ctx.filters;
        let category = filters.entity_type.as_ref().map(|t| t.as_str());
        let hits = self
            .candidates(Collection::Entities, embedding, quota, filters, category)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids = unique_ids(&hits);
        let entities: HashMap<String, Entity> =
            hydrate(&ids, |chunk| self.store.get_entities_by_ids(chunk))
                .await?
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect();

        let mut results = Vec::with_capacity(hits.len());
        for hit in &hits {
            let Some(entity) = entities.get(&hit.id) else {
                debug!(id = %hit.id, "Indexed entity missing from store");
                continue;
            };
            if !filters.matches_entity(entity) {
                continue;
            }
            let normalized = self.scoring.normalize_similarity(hit.similarity);
            let score = self.scoring.calculate_entity_score(ctx, normalized, entity);
            results.push(SearchResult {
                kind: ResultKind::Entity,
                id: entity.id.clone(),
                raw_similarity: hit.similarity,
                normalized_similarity: normalized,
                score: score.value,
                breakdown: score.breakdown,
                payload: ResultPayload::Entity(entity.clone()),
            });
        }
        Ok(rank_and_truncate(results, quota))
    }

    async fn relation_results(
        &self,
        embedding: &[f32],
        quota: usize,
        ctx: &QueryContext<'_>,
    ) -> Result<Vec<SearchResult>> {
        let filters = ctx.filters;
        let hits = self
            .candidates(
                Collection::Relations,
                embedding,
                quota,
                filters,
                filters.relation_type.as_deref(),
            )
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids = unique_ids(&hits);
        let relations: HashMap<_, _> =
            hydrate(&ids, |chunk| self.store.get_relations_by_ids(chunk))
                .await?
                .into_iter()
                .filter(|r| filters.matches_relation(r))
                .map(|r| (r.id.clone(), r))
                .collect();

        let endpoint_ids: Vec<String> = relations
            .values()
            .flat_map(|r| r.endpoint_ids())
            .map(str::to_string)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let names = self.endpoint_names(&endpoint_ids).await;
        let display = |id: Option<&String>| {
            id.map(|id| names.get(id).cloned().unwrap_or_else(|| id.clone()))
        };

        let mut results = Vec::with_capacity(relations.len());
        for hit in &hits {
            let Some(relation) = relations.get(&hit.id) else {
                continue;
            };
            let source_name = display(relation.source_entity_id.as_ref());
            let target_name = display(relation.target_entity_id.as_ref());

            let normalized = self.scoring.normalize_similarity(hit.similarity);
            let score = self.scoring.calculate_relation_score(
                ctx,
                normalized,
                relation,
                source_name.as_deref(),
                target_name.as_deref(),
            );
            results.push(SearchResult {
                kind: ResultKind::Relation,
                id: relation.id.clone(),
                raw_similarity: hit.similarity,
                normalized_similarity: normalized,
                score: score.value,
                breakdown: score.breakdown,
                payload: ResultPayload::Relation(RelationHit {
                    relation: relation.clone(),
                    source_name,
                    target_name,
                }),
            });
        }
        Ok(rank_and_truncate(results, quota))
    }

    /// Entity names for relation endpoints; a failed lookup leaves the map empty
    async fn endpoint_names(&self, ids: &[String]) -> HashMap<String, String> {
        if ids.is_empty() {
            return HashMap::new();
        }
        match hydrate(ids, |chunk| self.store.get_entities_by_ids(chunk)).await {
            Ok(entities) => entities.into_iter().map(|e| (e.id, e.name)).collect(),
            Err(e) => {
                warn!(error = %e, count = ids.len(), "Endpoint name lookup failed; using raw ids");
                HashMap::new()
            }
        }
    }

    async fn topic_results(
        &self,
        embedding: &[f32],
        quota: usize,
        ctx: &QueryContext<'_>,
    ) -> Result<Vec<SearchResult>> {
        let filters = ctx.filters;
        let hits = self
            .candidates(
                Collection::Topics,
                embedding,
                quota,
                filters,
                filters.topic_semantic_category.as_deref(),
            )
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let keyed: Vec<(&IndexHit, TopicKey)> = hits
            .iter()
            .filter_map(|hit| match topic_key(hit) {
                Some(key) => Some((hit, key)),
                None => {
                    debug!(id = %hit.id, "Topic hit without a resolvable key");
                    None
                }
            })
            .collect();
        let keys: Vec<TopicKey> = keyed
            .iter()
            .map(|(_, key)| key.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let topics: HashMap<TopicKey, Topic> =
            hydrate(&keys, |chunk| self.store.get_topics_by_keys(chunk))
                .await?
                .into_iter()
                .map(|t| (t.key(), t))
                .collect();

        let mut results = Vec::with_capacity(keyed.len());
        for (hit, key) in keyed {
            let normalized = self.scoring.normalize_similarity(hit.similarity);
            let (summary, score) = match topics.get(&key) {
                Some(topic) => {
                    let mut summary = TopicSummary::from(topic);
                    if summary.organization_id.is_empty() {
                        summary.organization_id = hit
                            .meta("organization_id")
                            .unwrap_or_default()
                            .to_string();
                    }
                    if !filters.matches_topic(
                        &summary.organization_id,
                        topic.semantic_category.as_deref(),
                        topic.created_at,
                        topic.updated_at,
                    ) {
                        continue;
                    }
                    let score = self.scoring.calculate_topic_score(
                        ctx,
                        normalized,
                        &TopicSignals::from(topic),
                    );
                    (summary, score)
                }
                None => {
                    let summary = topic_from_index(hit, key, filters);
                    if !filters.matches_topic(
                        &summary.organization_id,
                        summary.semantic_category.as_deref(),
                        None,
                        None,
                    ) {
                        continue;
                    }
                    let score = self.scoring.calculate_topic_score(
                        ctx,
                        normalized,
                        &TopicSignals::from(&summary),
                    );
                    (summary, score)
                }
            };

            results.push(SearchResult {
                kind: ResultKind::Topic,
                id: summary.key().record_id(),
                raw_similarity: hit.similarity,
                normalized_similarity: normalized,
                score: score.value,
                breakdown: score.breakdown,
                payload: ResultPayload::Topic(summary),
            });
        }
        Ok(rank_and_truncate(results, quota))
    }

    async fn record_topic_usage(&self, results: &[SearchResult]) {
        if !self.track_topic_usage {
            return;
        }
        let keys: Vec<TopicKey> = results
            .iter()
            .filter_map(|r| r.topic().map(TopicSummary::key))
            .collect();
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.store.increment_topic_search_counts(&keys).await {
            warn!(error = %e, topics = keys.len(), "Failed to record topic usage");
        }
    }
}

fn unique_ids(hits: &[IndexHit]) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.id.as_str()))
        .map(|h| h.id.clone())
        .collect()
}

/// Run batched lookups over `keys` in chunks, a few at a time
async fn hydrate<'a, K, T, F, Fut>(keys: &'a [K], fetch: F) -> Result<Vec<T>>
where
    F: FnMut(&'a [K]) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let batches: Vec<Result<Vec<T>>> = stream::iter(keys.chunks(HYDRATION_CHUNK_SIZE))
        .map(fetch)
        .buffered(HYDRATION_CONCURRENCY)
        .collect()
        .await;

    let mut items = Vec::with_capacity(keys.len());
    for batch in batches {
        items.extend(batch?);
    }
    Ok(items)
}

/// Explicit key fields in the hit metadata win over parsing the record id
fn topic_key(hit: &IndexHit) -> Option<TopicKey> {
    match (hit.meta("topic_id"), hit.meta("meeting_note_id")) {
        (Some(topic_id), Some(note_id)) => Some(TopicKey::new(topic_id, note_id)),
        _ => TopicKey::parse_record_id(&hit.id),
    }
}

/// Minimal topic built from denormalised index metadata
fn topic_from_index(hit: &IndexHit, key: TopicKey, filters: &SearchFilters) -> TopicSummary {
    let organization_id = hit
        .meta("organization_id")
        .or(filters.organization_id.as_deref())
        .unwrap_or_default()
        .to_string();
    let keywords = hit
        .meta("keywords")
        .map(|k| {
            k.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    TopicSummary {
        title: hit.meta("title").unwrap_or(&key.topic_id).to_string(),
        content_summary: hit.meta("content_summary").unwrap_or_default().to_string(),
        semantic_category: hit
            .meta("semantic_category")
            .or(hit.meta(CATEGORY_KEY))
            .map(str::to_string),
        keywords,
        organization_id,
        topic_id: key.topic_id,
        meeting_note_id: key.meeting_note_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{EntityType, Relation};
    use crate::embedding::SimpleEmbeddingProvider;
    use crate::storage::InMemoryGraphStore;
    use crate::vector::{EmbeddingRecord, InMemoryVectorIndex, SimilarityScale};
    use async_trait::async_trait;

    const DIM: usize = 64;

    fn embeddings() -> EmbeddingService {
        EmbeddingService::builder(Arc::new(SimpleEmbeddingProvider::new(DIM)))
            .dimension(DIM)
            .build()
            .unwrap()
    }

    /// Returns canned hits per collection, or fails for one collection
    #[derive(Default)]
    struct CannedIndex {
        hits: HashMap<Collection, Vec<IndexHit>>,
        failing: Option<Collection>,
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        fn similarity_scale(&self) -> SimilarityScale {
            SimilarityScale::Unit
        }

        async fn save(&self, _: Collection, _: &EmbeddingRecord) -> Result<()> {
            Ok(())
        }

        async fn get(&self, _: Collection, _: &str, _: &str) -> Result<Option<EmbeddingRecord>> {
            Ok(None)
        }

        async fn find_similar(
            &self,
            collection: Collection,
            query: &SimilarityQuery<'_>,
        ) -> Result<Vec<IndexHit>> {
            if self.failing == Some(collection) {
                return Err(Error::VectorIndex("unavailable".to_string()));
            }
            let mut hits = self.hits.get(&collection).cloned().unwrap_or_default();
            hits.truncate(query.limit);
            Ok(hits)
        }

        async fn delete(&self, _: Collection, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn orchestrator(index: impl VectorIndex + 'static, store: InMemoryGraphStore) -> SearchOrchestrator {
        SearchOrchestrator::builder(embeddings(), Arc::new(index), Arc::new(store))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_blank_query_and_zero_limit() {
        let search = orchestrator(CannedIndex::default(), InMemoryGraphStore::new());
        let filters = SearchFilters::default();
        assert!(search.search("   ", 5, &filters).await.unwrap().is_empty());
        assert!(search.search("acme", 0, &filters).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relation_endpoints_fall_back_to_ids() {
        let store = InMemoryGraphStore::new();
        store
            .save_entity(&Entity::new("Acme", EntityType::Organization, "org1").with_id("e1"))
            .await
            .unwrap();
        store
            .save_relation(
                &Relation::new("partners_with", "org1")
                    .with_id("r1")
                    .with_endpoints("e1", "missing"),
            )
            .await
            .unwrap();

        let mut index = CannedIndex::default();
        index
            .hits
            .insert(Collection::Relations, vec![IndexHit::new("r1", 0.8)]);

        let search = orchestrator(index, store);
        let results = search
            .search_relations("acme partners", 5, &SearchFilters::default())
            .await
            .unwrap();

        let hit = results[0].relation().unwrap();
        assert_eq!(hit.source_name.as_deref(), Some("Acme"));
        assert_eq!(hit.target_name.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn test_topic_falls_back_to_index_metadata() {
        let mut index = CannedIndex::default();
        index.hits.insert(
            Collection::Topics,
            vec![
                IndexHit::new("note1-topic-t1", 0.7)
                    .with_metadata("title", "Quarterly budget")
                    .with_metadata("content_summary", "Budget discussion")
                    .with_metadata("organization_id", "org1"),
            ],
        );

        let search = orchestrator(index, InMemoryGraphStore::new());
        let results = search
            .search_topics("budget", 5, &SearchFilters::for_organization("org1"))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let topic = results[0].topic().unwrap();
        assert_eq!(topic.title, "Quarterly budget");
        assert_eq!(topic.meeting_note_id, "note1");
        assert_eq!(topic.topic_id, "t1");
        assert_eq!(results[0].id, "note1-topic-t1");
    }

    #[tokio::test]
    async fn test_failing_type_degrades() {
        let store = InMemoryGraphStore::new();
        store
            .save_entity(&Entity::new("Acme", EntityType::Organization, "org1").with_id("e1"))
            .await
            .unwrap();

        let mut index = CannedIndex {
            failing: Some(Collection::Topics),
            ..Default::default()
        };
        index
            .hits
            .insert(Collection::Entities, vec![IndexHit::new("e1", 0.9)]);

        let search = orchestrator(index, store);
        let results = search.search("acme", 6, &SearchFilters::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Entity);
    }

    #[tokio::test]
    async fn test_filters_exclude_after_hydration() {
        let store = InMemoryGraphStore::new();
        store
            .save_entity(&Entity::new("Acme", EntityType::Organization, "org1").with_id("e1"))
            .await
            .unwrap();
        store
            .save_entity(&Entity::new("Jane", EntityType::Person, "org1").with_id("e2"))
            .await
            .unwrap();

        let mut index = CannedIndex::default();
        index.hits.insert(
            Collection::Entities,
            vec![IndexHit::new("e1", 0.9), IndexHit::new("e2", 0.8)],
        );

        let search = orchestrator(index, store);
        let filters = SearchFilters::default().with_entity_type(EntityType::Person);
        let results = search.search_entities("who", 5, &filters).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "e2");
    }

    #[tokio::test]
    async fn test_end_to_end_with_memory_index() {
        let embeddings = embeddings();
        let index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(InMemoryGraphStore::new());

        let entity = Entity::new("Acme Corp", EntityType::Organization, "org1").with_id("e1");
        store.save_entity(&entity).await.unwrap();
        let vector = embeddings.generate_embedding("Acme Corp").await.unwrap();
        index
            .save(
                Collection::Entities,
                &EmbeddingRecord::new("e1", "org1", vector, "simple"),
            )
            .await
            .unwrap();

        let search = SearchOrchestrator::builder(embeddings, index, store)
            .build()
            .unwrap();
        let results = search
            .search("acme corp", 3, &SearchFilters::for_organization("org1"))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].normalized_similarity > 0.9);
        assert!(results[0].score > 0.5);
    }

    #[tokio::test]
    async fn test_topic_usage_tracking() {
        let store = Arc::new(InMemoryGraphStore::new());
        let topic = Topic::new(TopicKey::new("t1", "n1"), "Budget", "Budget talk", "org1");
        store.save_topic(&topic).await.unwrap();

        let mut index = CannedIndex::default();
        index
            .hits
            .insert(Collection::Topics, vec![IndexHit::new("n1-topic-t1", 0.9)]);

        let search = SearchOrchestrator::builder(embeddings(), Arc::new(index), store.clone())
            .track_topic_usage(true)
            .build()
            .unwrap();
        search.search("budget", 3, &SearchFilters::default()).await.unwrap();

        let stored = store.get_topic(&TopicKey::new("t1", "n1")).await.unwrap().unwrap();
        assert_eq!(stored.search_count, 1);
    }
}
