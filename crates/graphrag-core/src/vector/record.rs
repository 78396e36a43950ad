//! Records stored in and returned by the vector index

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::embedding::validate_dimension;
use crate::error::Result;

/// Version tag written with every record; bump when the embedding text layout changes
pub const EMBEDDING_VERSION: &str = "2";

/// One collection per graph object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Entities,
    Relations,
    Topics,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Relations => "relations",
            Self::Topics => "topics",
        }
    }

    pub fn all() -> &'static [Collection] {
        &[Self::Entities, Self::Relations, Self::Topics]
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding of one graph object plus denormalized display fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub organization_id: String,
    pub combined_embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_embedding: Option<Vec<f32>>,
    pub embedding_model: String,
    pub embedding_version: String,
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(
        id: impl Into<String>,
        organization_id: impl Into<String>,
        combined_embedding: Vec<f32>,
        embedding_model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            combined_embedding,
            name_embedding: None,
            metadata_embedding: None,
            embedding_model: embedding_model.into(),
            embedding_version: EMBEDDING_VERSION.to_string(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a display field; empty values are skipped
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    pub fn with_name_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.name_embedding = Some(embedding);
        self
    }

    pub fn with_metadata_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.metadata_embedding = Some(embedding);
        self
    }

    /// Every vector of the record must have `dimension` components
    pub fn validate(&self, dimension: usize) -> Result<()> {
        validate_dimension(&self.combined_embedding, dimension)?;
        if let Some(v) = &self.name_embedding {
            validate_dimension(v, dimension)?;
        }
        if let Some(v) = &self.metadata_embedding {
            validate_dimension(v, dimension)?;
        }
        Ok(())
    }
}

/// Nearest-neighbour match returned by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub id: String,
    /// Raw score in the index's [`SimilarityScale`](super::SimilarityScale).
    /// NaN when the index sent none; scoring treats that as 0.
    #[serde(default = "missing_similarity", deserialize_with = "lenient_similarity")]
    pub similarity: f32,
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: BTreeMap<String, String>,
}

fn missing_similarity() -> f32 {
    f32::NAN
}

fn lenient_similarity<'de, D>(deserializer: D) -> std::result::Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|v| v as f32).unwrap_or(f32::NAN))
}

/// Scalars become strings, nulls are dropped, nested values keep their JSON text
fn lenient_metadata<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect())
}

impl IndexHit {
    pub fn new(id: impl Into<String>, similarity: f32) -> Self {
        Self {
            id: id.into(),
            similarity,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}
