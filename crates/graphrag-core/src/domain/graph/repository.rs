//! Store trait for the authoritative graph objects
//!
//! Search hydrates candidates through the batched lookups; single-id lookups
//! exist for convenience and default to the batched ones.

use async_trait::async_trait;

use crate::error::Result;

use super::entity::Entity;
use super::relation::Relation;
use super::topic::{Topic, TopicKey};

/// Authoritative store of entities, relations and topics
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Batched Lookups ==========

    /// Fetch entities by id; unknown ids are skipped
    async fn get_entities_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>>;

    /// Fetch relations by id; unknown ids are skipped
    async fn get_relations_by_ids(&self, ids: &[String]) -> Result<Vec<Relation>>;

    /// Fetch topics by composite key; unknown keys are skipped
    async fn get_topics_by_keys(&self, keys: &[TopicKey]) -> Result<Vec<Topic>>;

    // ========== Single Lookups ==========

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self
            .get_entities_by_ids(&[id.to_string()])
            .await?
            .into_iter()
            .next())
    }

    async fn get_relation(&self, id: &str) -> Result<Option<Relation>> {
        Ok(self
            .get_relations_by_ids(&[id.to_string()])
            .await?
            .into_iter()
            .next())
    }

    async fn get_topic(&self, key: &TopicKey) -> Result<Option<Topic>> {
        Ok(self
            .get_topics_by_keys(std::slice::from_ref(key))
            .await?
            .into_iter()
            .next())
    }

    // ========== Ingestion ==========

    /// Save an entity (insert or update)
    async fn save_entity(&self, entity: &Entity) -> Result<()>;

    /// Save a relation (insert or update)
    async fn save_relation(&self, relation: &Relation) -> Result<()>;

    /// Save a topic (insert or update)
    async fn save_topic(&self, topic: &Topic) -> Result<()>;

    async fn list_entities(&self, organization_id: &str) -> Result<Vec<Entity>>;

    async fn list_relations(&self, organization_id: &str) -> Result<Vec<Relation>>;

    async fn list_topics(&self, organization_id: &str) -> Result<Vec<Topic>>;

    /// Bump the usage counter of topics returned by a search
    async fn increment_topic_search_counts(&self, keys: &[TopicKey]) -> Result<()>;
}
