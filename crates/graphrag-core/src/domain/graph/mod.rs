//! Knowledge graph domain module
//!
//! Three object kinds make up the graph:
//!
//! - **Entity**: a named object (person, organization, place, ...)
//! - **Relation**: a typed, directed link between two entities
//! - **Topic**: discussion content extracted from a meeting note, identified by
//!   the composite [`TopicKey`]
//!
//! [`SearchFilters`] decide which hydrated candidates a search may return, and
//! [`GraphStore`] abstracts the authoritative store the candidates come from.

mod entity;
mod filters;
mod relation;
mod repository;
mod topic;

pub use entity::{Entity, EntityMetadata, EntityType};
pub use filters::{FilterLogic, SearchFilters};
pub use relation::{Relation, RelationMetadata};
pub use repository::GraphStore;
pub use topic::{Importance, Topic, TopicKey, TopicSummary};
