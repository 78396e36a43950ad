//! Search filters applied to hydrated candidates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityType};
use super::relation::Relation;

/// How date-range bounds combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLogic {
    /// Every date bound that is set must hold
    #[default]
    And,
    /// At least one date bound that is set must hold
    Or,
}

impl FilterLogic {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "and" | "all" => Some(Self::And),
            "or" | "any" => Some(Self::Or),
            _ => None,
        }
    }
}

/// Inclusion criteria for search results.
///
/// Organization, type and category are hard predicates. Date bounds combine via
/// `filter_logic`; a candidate without the relevant timestamp passes that bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub organization_id: Option<String>,
    pub entity_type: Option<EntityType>,
    pub relation_type: Option<String>,
    pub topic_semantic_category: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub filter_logic: FilterLogic,
}

impl SearchFilters {
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(organization_id.into()),
            ..Default::default()
        }
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn with_relation_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    pub fn with_topic_category(mut self, category: impl Into<String>) -> Self {
        self.topic_semantic_category = Some(category.into());
        self
    }

    pub fn with_logic(mut self, logic: FilterLogic) -> Self {
        self.filter_logic = logic;
        self
    }

    pub fn has_date_bounds(&self) -> bool {
        self.created_after.is_some()
            || self.created_before.is_some()
            || self.updated_after.is_some()
            || self.updated_before.is_some()
    }

    pub fn matches_organization(&self, organization_id: &str) -> bool {
        match &self.organization_id {
            Some(org) => org == organization_id,
            None => true,
        }
    }

    pub fn matches_entity(&self, entity: &Entity) -> bool {
        if !self.matches_organization(&entity.organization_id) {
            return false;
        }
        if let Some(wanted) = &self.entity_type {
            if wanted != &entity.entity_type {
                return false;
            }
        }
        self.matches_dates(entity.created_at, entity.updated_at)
    }

    pub fn matches_relation(&self, relation: &Relation) -> bool {
        if !self.matches_organization(&relation.organization_id) {
            return false;
        }
        if let Some(wanted) = &self.relation_type {
            if !wanted.eq_ignore_ascii_case(&relation.relation_type) {
                return false;
            }
        }
        self.matches_dates(relation.created_at, relation.updated_at)
    }

    /// Topic predicate over the fields available after hydration
    pub fn matches_topic(
        &self,
        organization_id: &str,
        semantic_category: Option<&str>,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> bool {
        if !self.matches_organization(organization_id) {
            return false;
        }
        if let Some(wanted) = &self.topic_semantic_category {
            match semantic_category {
                Some(category) if wanted.eq_ignore_ascii_case(category) => {}
                _ => return false,
            }
        }
        self.matches_dates(created_at, updated_at)
    }

    /// Date-range check. Missing timestamps pass their bounds.
    pub fn matches_dates(
        &self,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> bool {
        let checks: Vec<bool> = [
            self.created_after
                .map(|bound| created_at.is_none_or(|t| t >= bound)),
            self.created_before
                .map(|bound| created_at.is_none_or(|t| t <= bound)),
            self.updated_after
                .map(|bound| updated_at.is_none_or(|t| t >= bound)),
            self.updated_before
                .map(|bound| updated_at.is_none_or(|t| t <= bound)),
        ]
        .into_iter()
        .flatten()
        .collect();

        if checks.is_empty() {
            return true;
        }
        match self.filter_logic {
            FilterLogic::And => checks.iter().all(|&ok| ok),
            FilterLogic::Or => checks.iter().any(|&ok| ok),
        }
    }
}
