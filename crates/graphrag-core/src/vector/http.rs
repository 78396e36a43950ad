//! HTTP client for the vector index service
//!
//! Endpoints, relative to the base URL:
//! - `PUT    /collections/{c}/records/{id}` with the record as body
//! - `GET    /collections/{c}/records/{id}?organization_id=`
//! - `POST   /collections/{c}/query` with a [`SimilarityQuery`] body
//! - `DELETE /collections/{c}/records/{id}?organization_id=`

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

use super::index::{SimilarityQuery, SimilarityScale, VectorIndex};
use super::record::{Collection, EmbeddingRecord, IndexHit};

/// Caller-side budget for one index call
pub const DEFAULT_INDEX_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<IndexHit>,
}

/// Vector index reached over JSON REST
#[derive(Debug, Clone)]
pub struct HttpVectorIndex {
    http_client: HttpClient,
    base_url: Url,
    timeout: Duration,
    scale: SimilarityScale,
}

/// Builder for creating an HttpVectorIndex
#[derive(Default)]
pub struct HttpVectorIndexBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    scale: Option<SimilarityScale>,
}

impl HttpVectorIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Scale of the scores the service returns (defaults to [0, 1])
    pub fn scale(mut self, scale: SimilarityScale) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn build(self) -> Result<HttpVectorIndex> {
        let raw = self
            .base_url
            .ok_or_else(|| Error::Config("vector index URL is required".to_string()))?;
        let base_url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid vector index URL '{raw}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid vector index URL '{raw}'")));
        }

        Ok(HttpVectorIndex {
            http_client: HttpClient::builder().build()?,
            base_url,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_INDEX_TIMEOUT_SECS)),
            scale: self.scale.unwrap_or_default(),
        })
    }
}

impl HttpVectorIndex {
    pub fn builder() -> HttpVectorIndexBuilder {
        HttpVectorIndexBuilder::new()
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("invalid vector index URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn record_url(&self, collection: Collection, id: &str) -> Result<Url> {
        self.url(&["collections", collection.as_str(), "records", id])
    }

    /// Run `call` under the caller-side timeout
    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("vector index {operation}"),
                self.timeout,
            )),
        }
    }
}

/// Parse a success body; a body that does not match is an index error, not a network one
async fn decode<T: DeserializeOwned>(operation: &str, response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::VectorIndex(format!("{operation} returned a malformed response: {e}")))
}

async fn failure(operation: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::VectorIndex(format!("{operation} failed ({status}): {body}"))
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    fn similarity_scale(&self) -> SimilarityScale {
        self.scale
    }

    async fn save(&self, collection: Collection, record: &EmbeddingRecord) -> Result<()> {
        let url = self.record_url(collection, &record.id)?;
        debug!(collection = %collection, id = %record.id, "Saving embedding record");

        self.bounded("save", async {
            let response = self.http_client.put(url).json(record).send().await?;
            if !response.status().is_success() {
                return Err(failure("save", response).await);
            }
            Ok(())
        })
        .await
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<EmbeddingRecord>> {
        let url = self.record_url(collection, id)?;

        self.bounded("get", async {
            let response = self
                .http_client
                .get(url)
                .query(&[("organization_id", organization_id)])
                .send()
                .await?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                s if s.is_success() => Ok(Some(decode::<EmbeddingRecord>("get", response).await?)),
                _ => Err(failure("get", response).await),
            }
        })
        .await
    }

    async fn find_similar(
        &self,
        collection: Collection,
        query: &SimilarityQuery<'_>,
    ) -> Result<Vec<IndexHit>> {
        let url = self.url(&["collections", collection.as_str(), "query"])?;
        debug!(
            collection = %collection,
            limit = query.limit,
            organization_id = ?query.organization_id,
            "Querying vector index"
        );

        self.bounded("query", async {
            let response = self.http_client.post(url).json(query).send().await?;
            if !response.status().is_success() {
                return Err(failure("query", response).await);
            }
            let body: QueryResponse = decode("query", response).await?;
            Ok(body.results)
        })
        .await
    }

    async fn delete(&self, collection: Collection, id: &str, organization_id: &str) -> Result<bool> {
        let url = self.record_url(collection, id)?;

        self.bounded("delete", async {
            let response = self
                .http_client
                .delete(url)
                .query(&[("organization_id", organization_id)])
                .send()
                .await?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(false),
                s if s.is_success() => Ok(true),
                _ => Err(failure("delete", response).await),
            }
        })
        .await
    }
}
