//! SQLite implementation of the GraphStore
//!
//! List-valued and metadata columns are stored as JSON text. Batched lookups
//! run one `IN (...)` query per chunk of ids.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::graph::{
    Entity, EntityType, GraphStore, Importance, Relation, Topic, TopicKey,
};
use crate::error::Result;

/// Bound parameters per batched query, well under SQLite's variable limit
const MAX_BATCH_PARAMS: usize = 500;

#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    // ========== Batched Lookups ==========

    async fn get_entities_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>> {
        let mut entities = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_PARAMS) {
            let sql = format!(
                "SELECT * FROM entities WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query_as::<_, EntityRow>(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.pool).await? {
                entities.push(row.into_entity()?);
            }
        }
        debug!(requested = ids.len(), found = entities.len(), "Entities loaded");
        Ok(entities)
    }

    async fn get_relations_by_ids(&self, ids: &[String]) -> Result<Vec<Relation>> {
        let mut relations = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_PARAMS) {
            let sql = format!(
                "SELECT * FROM relations WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query_as::<_, RelationRow>(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.pool).await? {
                relations.push(row.into_relation()?);
            }
        }
        debug!(requested = ids.len(), found = relations.len(), "Relations loaded");
        Ok(relations)
    }

    async fn get_topics_by_keys(&self, keys: &[TopicKey]) -> Result<Vec<Topic>> {
        let mut topics = Vec::with_capacity(keys.len());
        // two parameters per key
        for chunk in keys.chunks(MAX_BATCH_PARAMS / 2) {
            let predicate = vec!["(topic_id = ? AND meeting_note_id = ?)"; chunk.len()].join(" OR ");
            let sql = format!("SELECT * FROM topics WHERE {predicate}");
            let mut query = sqlx::query_as::<_, TopicRow>(&sql);
            for key in chunk {
                query = query.bind(&key.topic_id).bind(&key.meeting_note_id);
            }
            for row in query.fetch_all(&self.pool).await? {
                topics.push(row.into_topic()?);
            }
        }
        debug!(requested = keys.len(), found = topics.len(), "Topics loaded");
        Ok(topics)
    }

    // ========== Ingestion ==========

    async fn save_entity(&self, entity: &Entity) -> Result<()> {
        let aliases_json = serde_json::to_string(&entity.aliases)?;
        let metadata_json = serde_json::to_string(&entity.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO entities (
                id, organization_id, name, entity_type, aliases, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                name = excluded.name,
                entity_type = excluded.entity_type,
                aliases = excluded.aliases,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.organization_id)
        .bind(&entity.name)
        .bind(entity.entity_type.as_str())
        .bind(&aliases_json)
        .bind(&metadata_json)
        .bind(timestamp(entity.created_at))
        .bind(timestamp(entity.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(entity_id = %entity.id, entity_name = %entity.name, "Entity saved");
        Ok(())
    }

    async fn save_relation(&self, relation: &Relation) -> Result<()> {
        let metadata_json = serde_json::to_string(&relation.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO relations (
                id, organization_id, relation_type, source_entity_id, target_entity_id,
                description, confidence, metadata, topic_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                relation_type = excluded.relation_type,
                source_entity_id = excluded.source_entity_id,
                target_entity_id = excluded.target_entity_id,
                description = excluded.description,
                confidence = excluded.confidence,
                metadata = excluded.metadata,
                topic_id = excluded.topic_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relation.id)
        .bind(&relation.organization_id)
        .bind(&relation.relation_type)
        .bind(&relation.source_entity_id)
        .bind(&relation.target_entity_id)
        .bind(&relation.description)
        .bind(relation.confidence)
        .bind(&metadata_json)
        .bind(&relation.topic_id)
        .bind(timestamp(relation.created_at))
        .bind(timestamp(relation.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(relation_id = %relation.id, relation_type = %relation.relation_type, "Relation saved");
        Ok(())
    }

    async fn save_topic(&self, topic: &Topic) -> Result<()> {
        let keywords_json = serde_json::to_string(&topic.keywords)?;
        let tags_json = serde_json::to_string(&topic.tags)?;

        sqlx::query(
            r#"
            INSERT INTO topics (
                topic_id, meeting_note_id, organization_id, title, content, summary,
                semantic_category, keywords, tags, importance, search_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(topic_id, meeting_note_id) DO UPDATE SET
                organization_id = excluded.organization_id,
                title = excluded.title,
                content = excluded.content,
                summary = excluded.summary,
                semantic_category = excluded.semantic_category,
                keywords = excluded.keywords,
                tags = excluded.tags,
                importance = excluded.importance,
                search_count = MAX(topics.search_count, excluded.search_count),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&topic.topic_id)
        .bind(&topic.meeting_note_id)
        .bind(&topic.organization_id)
        .bind(&topic.title)
        .bind(&topic.content)
        .bind(&topic.summary)
        .bind(&topic.semantic_category)
        .bind(&keywords_json)
        .bind(&tags_json)
        .bind(topic.importance.map(|i| i.as_str()))
        .bind(i64::from(topic.search_count))
        .bind(timestamp(topic.created_at))
        .bind(timestamp(topic.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(topic = %topic.key(), title = %topic.title, "Topic saved");
        Ok(())
    }

    async fn list_entities(&self, organization_id: &str) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> =
            sqlx::query_as("SELECT * FROM entities WHERE organization_id = ? ORDER BY name, id")
                .bind(organization_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    async fn list_relations(&self, organization_id: &str) -> Result<Vec<Relation>> {
        let rows: Vec<RelationRow> = sqlx::query_as(
            "SELECT * FROM relations WHERE organization_id = ? ORDER BY relation_type, id",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RelationRow::into_relation).collect()
    }

    async fn list_topics(&self, organization_id: &str) -> Result<Vec<Topic>> {
        let rows: Vec<TopicRow> = sqlx::query_as(
            "SELECT * FROM topics WHERE organization_id = ? ORDER BY meeting_note_id, topic_id",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TopicRow::into_topic).collect()
    }

    async fn increment_topic_search_counts(&self, keys: &[TopicKey]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query(
                "UPDATE topics SET search_count = search_count + 1 \
                 WHERE topic_id = ? AND meeting_note_id = ?",
            )
            .bind(&key.topic_id)
            .bind(&key.meeting_note_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    organization_id: String,
    name: String,
    entity_type: String,
    aliases: String,
    metadata: String,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl EntityRow {
    fn into_entity(self) -> Result<Entity> {
        Ok(Entity {
            entity_type: EntityType::parse(&self.entity_type),
            aliases: serde_json::from_str(&self.aliases)?,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_timestamp(self.created_at.as_deref()),
            updated_at: parse_timestamp(self.updated_at.as_deref()),
            id: self.id,
            name: self.name,
            organization_id: self.organization_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct RelationRow {
    id: String,
    organization_id: String,
    relation_type: String,
    source_entity_id: Option<String>,
    target_entity_id: Option<String>,
    description: Option<String>,
    confidence: Option<f32>,
    metadata: String,
    topic_id: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl RelationRow {
    fn into_relation(self) -> Result<Relation> {
        Ok(Relation {
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_timestamp(self.created_at.as_deref()),
            updated_at: parse_timestamp(self.updated_at.as_deref()),
            id: self.id,
            relation_type: self.relation_type,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            description: self.description,
            confidence: self.confidence,
            organization_id: self.organization_id,
            topic_id: self.topic_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct TopicRow {
    topic_id: String,
    meeting_note_id: String,
    organization_id: String,
    title: String,
    content: String,
    summary: Option<String>,
    semantic_category: Option<String>,
    keywords: String,
    tags: String,
    importance: Option<String>,
    search_count: i64,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl TopicRow {
    fn into_topic(self) -> Result<Topic> {
        Ok(Topic {
            keywords: serde_json::from_str(&self.keywords)?,
            tags: serde_json::from_str(&self.tags)?,
            importance: self.importance.as_deref().and_then(Importance::parse),
            search_count: u32::try_from(self.search_count).unwrap_or(0),
            created_at: parse_timestamp(self.created_at.as_deref()),
            updated_at: parse_timestamp(self.updated_at.as_deref()),
            topic_id: self.topic_id,
            meeting_note_id: self.meeting_note_id,
            organization_id: self.organization_id,
            title: self.title,
            content: self.content,
            summary: self.summary,
            semantic_category: self.semantic_category,
        })
    }
}
