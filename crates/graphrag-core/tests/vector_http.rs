//! HttpVectorIndex against a mock REST service

use std::time::Duration;

use graphrag_core::Error;
use graphrag_core::scoring::normalize_similarity;
use graphrag_core::vector::{
    Collection, EmbeddingRecord, HttpVectorIndex, SimilarityQuery, SimilarityScale, VectorIndex,
};
use mockito::{Matcher, Server};
use serde_json::json;

fn index(url: String) -> HttpVectorIndex {
    HttpVectorIndex::builder()
        .base_url(url)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_save_puts_record() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/collections/entities/records/e1")
        .match_body(Matcher::PartialJson(json!({
            "id": "e1",
            "organization_id": "org1",
            "combined_embedding": [1.0, 0.0],
            "metadata": { "name": "Acme" }
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let record = EmbeddingRecord::new("e1", "org1", vec![1.0, 0.0], "simple-hash")
        .with_metadata("name", "Acme");
    index(server.url())
        .save(Collection::Entities, &record)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_maps_not_found_to_none() {
    let mut server = Server::new_async().await;
    let _missing = server
        .mock("GET", "/collections/topics/records/n1-topic-t9")
        .match_query(Matcher::UrlEncoded("organization_id".into(), "org1".into()))
        .with_status(404)
        .create_async()
        .await;

    let record = EmbeddingRecord::new("n1-topic-t1", "org1", vec![0.5, 0.5], "simple-hash");
    let _found = server
        .mock("GET", "/collections/topics/records/n1-topic-t1")
        .match_query(Matcher::UrlEncoded("organization_id".into(), "org1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::to_string(&record).unwrap())
        .create_async()
        .await;

    let index = index(server.url());
    assert!(
        index
            .get(Collection::Topics, "n1-topic-t9", "org1")
            .await
            .unwrap()
            .is_none()
    );
    let loaded = index
        .get(Collection::Topics, "n1-topic-t1", "org1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.id, "n1-topic-t1");
    assert_eq!(loaded.combined_embedding, vec![0.5, 0.5]);
}

#[tokio::test]
async fn test_query_sends_scope_and_parses_hits() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/collections/relations/query")
        .match_body(Matcher::PartialJson(json!({
            "limit": 4,
            "organization_id": "org1",
            "category": "works_for"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "results": [
                    { "id": "r1", "similarity": 0.9, "metadata": { "relation_type": "works_for" } },
                    { "id": "r2", "similarity": 0.4 }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let embedding = [0.1, 0.2, 0.3];
    let query = SimilarityQuery::new(&embedding, 4)
        .organization(Some("org1"))
        .category(Some("works_for"));
    let hits = index(server.url())
        .find_similar(Collection::Relations, &query)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].meta("relation_type"), Some("works_for"));
    assert!(hits[1].metadata.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_loose_hits_keep_their_siblings() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/collections/topics/query")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "results": [
                    { "id": "n1-topic-t1", "similarity": 0.8, "metadata": { "title": "Pricing" } },
                    { "id": "n1-topic-t2", "similarity": null },
                    { "id": "n1-topic-t3" },
                    {
                        "id": "n1-topic-t4",
                        "similarity": 0.5,
                        "metadata": { "search_count": 3, "archived": false, "note": null }
                    }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let embedding = [1.0, 0.0];
    let hits = index(server.url())
        .find_similar(Collection::Topics, &SimilarityQuery::new(&embedding, 4))
        .await
        .unwrap();

    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0].similarity, 0.8);
    assert!(hits[1].similarity.is_nan());
    assert!(hits[2].similarity.is_nan());
    assert_eq!(normalize_similarity(hits[1].similarity, SimilarityScale::Unit), 0.0);
    assert_eq!(hits[3].meta("search_count"), Some("3"));
    assert_eq!(hits[3].meta("archived"), Some("false"));
    assert_eq!(hits[3].meta("note"), None);
}

#[tokio::test]
async fn test_malformed_body_is_index_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/collections/entities/query")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{\"results\": \"soon\"}")
        .create_async()
        .await;

    let embedding = [1.0];
    let err = index(server.url())
        .find_similar(Collection::Entities, &SimilarityQuery::new(&embedding, 2))
        .await
        .unwrap_err();
    match err {
        Error::VectorIndex(message) => assert!(message.contains("malformed response")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_reports_presence() {
    let mut server = Server::new_async().await;
    let _gone = server
        .mock("DELETE", "/collections/entities/records/e1")
        .match_query(Matcher::UrlEncoded("organization_id".into(), "org1".into()))
        .with_status(204)
        .create_async()
        .await;
    let _absent = server
        .mock("DELETE", "/collections/entities/records/e2")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let index = index(server.url());
    assert!(index.delete(Collection::Entities, "e1", "org1").await.unwrap());
    assert!(!index.delete(Collection::Entities, "e2", "org1").await.unwrap());
}

#[tokio::test]
async fn test_server_error_is_index_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/collections/entities/query")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let embedding = [1.0];
    let err = index(server.url())
        .find_similar(Collection::Entities, &SimilarityQuery::new(&embedding, 2))
        .await
        .unwrap_err();
    match err {
        Error::VectorIndex(message) => assert!(message.contains("overloaded")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_default_scale_is_unit() {
    let index = HttpVectorIndex::new("http://localhost:8000").unwrap();
    assert_eq!(index.similarity_scale(), SimilarityScale::Unit);
}
