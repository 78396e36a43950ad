//! In-process GraphStore for tests and experiments

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::graph::{Entity, GraphStore, Relation, Topic, TopicKey};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    entities: RwLock<HashMap<String, Entity>>,
    relations: RwLock<HashMap<String, Relation>>,
    topics: RwLock<HashMap<TopicKey, Topic>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_entities_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>> {
        let entities = self.entities.read().await;
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }

    async fn get_relations_by_ids(&self, ids: &[String]) -> Result<Vec<Relation>> {
        let relations = self.relations.read().await;
        Ok(ids.iter().filter_map(|id| relations.get(id).cloned()).collect())
    }

    async fn get_topics_by_keys(&self, keys: &[TopicKey]) -> Result<Vec<Topic>> {
        let topics = self.topics.read().await;
        Ok(keys.iter().filter_map(|key| topics.get(key).cloned()).collect())
    }

    async fn save_entity(&self, entity: &Entity) -> Result<()> {
        self.entities
            .write()
            .await
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn save_relation(&self, relation: &Relation) -> Result<()> {
        self.relations
            .write()
            .await
            .insert(relation.id.clone(), relation.clone());
        Ok(())
    }

    async fn save_topic(&self, topic: &Topic) -> Result<()> {
        let mut topics = self.topics.write().await;
        let mut topic = topic.clone();
        if let Some(existing) = topics.get(&topic.key()) {
            topic.search_count = topic.search_count.max(existing.search_count);
        }
        topics.insert(topic.key(), topic);
        Ok(())
    }

    async fn list_entities(&self, organization_id: &str) -> Result<Vec<Entity>> {
        let mut list: Vec<Entity> = self
            .entities
            .read()
            .await
            .values()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn list_relations(&self, organization_id: &str) -> Result<Vec<Relation>> {
        let mut list: Vec<Relation> = self
            .relations
            .read()
            .await
            .values()
            .filter(|r| r.organization_id == organization_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.relation_type
                .cmp(&b.relation_type)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(list)
    }

    async fn list_topics(&self, organization_id: &str) -> Result<Vec<Topic>> {
        let mut list: Vec<Topic> = self
            .topics
            .read()
            .await
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        list.sort_by_key(Topic::key);
        Ok(list)
    }

    async fn increment_topic_search_counts(&self, keys: &[TopicKey]) -> Result<()> {
        let mut topics = self.topics.write().await;
        for key in keys {
            if let Some(topic) = topics.get_mut(key) {
                topic.search_count = topic.search_count.saturating_add(1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::EntityType;

    #[tokio::test]
    async fn test_batched_lookups() {
        let store = InMemoryGraphStore::new();
        store
            .save_entity(&Entity::new("Acme", EntityType::Organization, "org1").with_id("e1"))
            .await
            .unwrap();

        let found = store
            .get_entities_by_ids(&["e1".to_string(), "e2".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.get_entity("e2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_scoped_by_org() {
        let store = InMemoryGraphStore::new();
        store
            .save_topic(&Topic::new(TopicKey::new("t1", "n1"), "A", "", "org1"))
            .await
            .unwrap();
        store
            .save_topic(&Topic::new(TopicKey::new("t2", "n1"), "B", "", "org2"))
            .await
            .unwrap();

        let topics = store.list_topics("org1").await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic_id, "t1");
    }

    #[tokio::test]
    async fn test_usage_counter_survives_resave() {
        let store = InMemoryGraphStore::new();
        let topic = Topic::new(TopicKey::new("t1", "n1"), "A", "", "org1");
        store.save_topic(&topic).await.unwrap();
        store
            .increment_topic_search_counts(&[topic.key()])
            .await
            .unwrap();
        store.save_topic(&topic).await.unwrap();

        let loaded = store.get_topic(&topic.key()).await.unwrap().unwrap();
        assert_eq!(loaded.search_count, 1);
    }
}
