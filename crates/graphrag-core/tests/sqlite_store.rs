//! SqliteGraphStore over real databases

use graphrag_core::domain::graph::{
    Entity, EntityType, GraphStore, Importance, Relation, Topic, TopicKey,
};
use graphrag_core::storage::{Database, DatabaseConfig, SqliteGraphStore};
use tempfile::TempDir;

#[tokio::test]
async fn test_batched_lookup_spans_many_chunks() {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteGraphStore::new(db.pool().clone());

    let ids: Vec<String> = (0..1200).map(|i| format!("e{i}")).collect();
    for (i, id) in ids.iter().enumerate() {
        store
            .save_entity(
                &Entity::new(format!("Entity {i}"), EntityType::Concept, "org1").with_id(id.clone()),
            )
            .await
            .unwrap();
    }

    let mut wanted = ids.clone();
    wanted.push("missing".to_string());
    let found = store.get_entities_by_ids(&wanted).await.unwrap();
    assert_eq!(found.len(), 1200);
}

#[tokio::test]
async fn test_topic_keys_in_bulk() {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteGraphStore::new(db.pool().clone());

    let keys: Vec<TopicKey> = (0..300)
        .map(|i| TopicKey::new(format!("t{i}"), format!("n{}", i % 7)))
        .collect();
    for key in &keys {
        store
            .save_topic(
                &Topic::new(key.clone(), "Weekly sync", "Notes", "org1")
                    .with_importance(Importance::Medium),
            )
            .await
            .unwrap();
    }

    let found = store.get_topics_by_keys(&keys).await.unwrap();
    assert_eq!(found.len(), 300);

    store
        .increment_topic_search_counts(&keys[..10])
        .await
        .unwrap();
    let bumped = store.get_topic(&keys[0]).await.unwrap().unwrap();
    assert_eq!(bumped.search_count, 1);
    let untouched = store.get_topic(&keys[20]).await.unwrap().unwrap();
    assert_eq!(untouched.search_count, 0);
}

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("graphrag.db");

    {
        let db = Database::new(DatabaseConfig::with_path(&path)).await.unwrap();
        let store = SqliteGraphStore::new(db.pool().clone());
        store
            .save_entity(&Entity::new("Acme", EntityType::Organization, "org1").with_id("e1"))
            .await
            .unwrap();
        store
            .save_relation(
                &Relation::new("owns", "org1")
                    .with_id("r1")
                    .with_endpoints("e1", "e2")
                    .with_confidence(0.75),
            )
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::open(&path).await.unwrap();
    let store = SqliteGraphStore::new(db.pool().clone());

    let entity = store.get_entity("e1").await.unwrap().unwrap();
    assert_eq!(entity.name, "Acme");
    let relations = store.list_relations("org1").await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].confidence, Some(0.75));
    assert!(store.list_relations("org2").await.unwrap().is_empty());
}
