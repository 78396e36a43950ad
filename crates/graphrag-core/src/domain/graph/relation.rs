//! Typed links between entities

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed, directed link between two entities.
///
/// Either endpoint may be missing when extraction could not resolve it; such
/// relations are still searchable and fall back to raw ids for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    /// Free-form tag, e.g. "works_for", "partners_with"
    pub relation_type: String,
    pub source_entity_id: Option<String>,
    pub target_entity_id: Option<String>,
    pub description: Option<String>,
    /// Extraction confidence in [0, 1]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub metadata: RelationMetadata,
    pub organization_id: String,
    /// Topic the relation was extracted from
    pub topic_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Relation {
    pub fn new(relation_type: impl Into<String>, organization_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            relation_type: relation_type.into(),
            source_entity_id: None,
            target_entity_id: None,
            description: None,
            confidence: None,
            metadata: RelationMetadata::default(),
            organization_id: organization_id.into(),
            topic_id: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_endpoints(
        mut self,
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
    ) -> Self {
        self.source_entity_id = Some(source_entity_id.into());
        self.target_entity_id = Some(target_entity_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = Some(topic_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: RelationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Ids of the endpoints that are set
    pub fn endpoint_ids(&self) -> impl Iterator<Item = &str> {
        self.source_entity_id
            .iter()
            .chain(self.target_entity_id.iter())
            .map(String::as_str)
    }
}

/// Known relation attributes, with unknown keys carried in `extra`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}
