//! Named entities of the knowledge graph

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::topic::Importance;

/// A named real-world object: a person, company, place, product, ...
///
/// `id` is unique within an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    /// Alternative names or spellings, in display order
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub metadata: EntityMetadata,
    pub organization_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Create a new entity with a generated id
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        organization_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            entity_type,
            aliases: Vec::new(),
            metadata: EntityMetadata::default(),
            organization_id: organization_id.into(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Add an alias unless an equal one (ignoring case) is present
    pub fn add_alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if !self
            .aliases
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&alias))
        {
            self.aliases.push(alias);
        }
    }

    /// Name plus aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Category tag of an entity
///
/// Stored as a lowercase string; unknown tags are preserved in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Product,
    Concept,
    Event,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Product => "product",
            Self::Concept => "concept",
            Self::Event => "event",
            Self::Other(tag) => tag,
        }
    }

    /// Parse from string; never fails
    pub fn parse(s: &str) -> Self {
        let tag = s.trim().to_lowercase();
        match tag.as_str() {
            "person" | "people" => Self::Person,
            "organization" | "organisation" | "company" | "org" => Self::Organization,
            "location" | "place" => Self::Location,
            "product" => Self::Product,
            "concept" => Self::Concept,
            "event" => Self::Event,
            _ => Self::Other(tag),
        }
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Known entity attributes, with unknown keys carried in `extra`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl EntityMetadata {
    /// Known text fields that are set, in display order
    pub fn known_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("description", &self.description),
            ("url", &self.url),
            ("location", &self.location),
            ("industry", &self.industry),
            ("role", &self.role),
            ("department", &self.department),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|v| (label, v)))
        .filter(|(_, v)| !v.trim().is_empty())
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.known_fields().is_empty() && self.importance.is_none() && self.extra.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_creation() {
        let entity = Entity::new("Acme Corp", EntityType::Organization, "org1")
            .with_aliases(vec!["ACME".into()])
            .with_description("Widget maker");

        assert!(!entity.id.is_empty());
        assert_eq!(entity.name, "Acme Corp");
        assert_eq!(entity.organization_id, "org1");
        assert_eq!(entity.metadata.description.as_deref(), Some("Widget maker"));
        assert!(entity.updated_at.is_some());
        assert_eq!(entity.names().collect::<Vec<_>>(), vec!["Acme Corp", "ACME"]);
    }

    #[test]
    fn test_add_alias_dedupes_case_insensitively() {
        let mut entity = Entity::new("Acme", EntityType::Organization, "org1");
        entity.add_alias("acme inc");
        entity.add_alias("ACME INC");
        assert_eq!(entity.aliases, vec!["acme inc"]);
    }

    #[test]
    fn test_entity_type_parse_and_display() {
        assert_eq!(EntityType::parse("Person"), EntityType::Person);
        assert_eq!(EntityType::parse("company"), EntityType::Organization);
        assert_eq!(EntityType::parse("Team"), EntityType::Other("team".into()));
        assert_eq!(EntityType::Other("team".into()).to_string(), "team");
    }

    #[test]
    fn test_entity_type_serde_as_string() {
        let json = serde_json::to_string(&EntityType::Location).unwrap();
        assert_eq!(json, "\"location\"");
        let parsed: EntityType = serde_json::from_str("\"vendor\"").unwrap();
        assert_eq!(parsed, EntityType::Other("vendor".into()));
    }

    #[test]
    fn test_metadata_preserves_unknown_keys() {
        let json = r#"{"description":"d","role":"CTO","twitter":"@acme","importance":"high"}"#;
        let metadata: EntityMetadata = serde_json::from_str(json).unwrap();

        assert_eq!(metadata.role.as_deref(), Some("CTO"));
        assert_eq!(metadata.importance, Some(Importance::High));
        assert_eq!(metadata.extra.get("twitter").map(String::as_str), Some("@acme"));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["twitter"], "@acme");
        assert!(back.get("url").is_none());
    }

    #[test]
    fn test_known_fields_order() {
        let metadata = EntityMetadata {
            department: Some("Sales".into()),
            description: Some("Lead".into()),
            url: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            metadata.known_fields(),
            vec![("description", "Lead"), ("department", "Sales")]
        );
        assert!(!metadata.is_empty());
        assert!(EntityMetadata::default().is_empty());
    }
}
