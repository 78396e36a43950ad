//! Search result types and the merge/rank step

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::graph::{Entity, Relation, TopicSummary};
use crate::scoring::ScoreBreakdown;

/// Object kind of a search result; declaration order breaks score ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Entity,
    Relation,
    Topic,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Entity => "entity",
            ResultKind::Relation => "relation",
            ResultKind::Topic => "topic",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relation with its endpoint names resolved for display
///
/// An endpoint whose entity could not be found carries its raw id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationHit {
    pub relation: Relation,
    pub source_name: Option<String>,
    pub target_name: Option<String>,
}

impl RelationHit {
    /// `type: source → target`, or just the type when no endpoint is known
    pub fn display_name(&self) -> String {
        let source = self.source_name.as_deref().unwrap_or("?");
        let target = self.target_name.as_deref().unwrap_or("?");
        if self.source_name.is_none() && self.target_name.is_none() {
            self.relation.relation_type.clone()
        } else {
            format!("{}: {source} → {target}", self.relation.relation_type)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultPayload {
    Entity(Entity),
    Relation(RelationHit),
    Topic(TopicSummary),
}

/// One ranked match; built per query and never cached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub kind: ResultKind,
    pub id: String,
    /// Score as returned by the index
    pub raw_similarity: f32,
    /// Similarity mapped onto [0, 1]
    pub normalized_similarity: f32,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
    pub payload: ResultPayload,
}

impl SearchResult {
    pub fn display_name(&self) -> String {
        match &self.payload {
            ResultPayload::Entity(entity) => entity.name.clone(),
            ResultPayload::Relation(hit) => hit.display_name(),
            ResultPayload::Topic(topic) => topic.title.clone(),
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        match &self.payload {
            ResultPayload::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn relation(&self) -> Option<&RelationHit> {
        match &self.payload {
            ResultPayload::Relation(hit) => Some(hit),
            _ => None,
        }
    }

    pub fn topic(&self) -> Option<&TopicSummary> {
        match &self.payload {
            ResultPayload::Topic(topic) => Some(topic),
            _ => None,
        }
    }
}

/// Score descending, then kind, then id
pub fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort, keep the best-scored copy of each (kind, id), and cut to `limit`
pub fn rank_and_truncate(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(rank_order);
    let mut seen = HashSet::new();
    results.retain(|r| seen.insert((r.kind, r.id.clone())));
    results.truncate(limit);
    results
}

/// Concatenate per-type lists and rank them together
pub fn merge_results<I>(lists: I, limit: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Vec<SearchResult>>,
{
    rank_and_truncate(lists.into_iter().flatten().collect(), limit)
}

/// Per-type share of the overall limit
pub fn per_type_quota(limit: usize) -> usize {
    limit.div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::EntityType;

    fn entity_result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            kind: ResultKind::Entity,
            id: id.to_string(),
            raw_similarity: score,
            normalized_similarity: score,
            score,
            breakdown: ScoreBreakdown::default(),
            payload: ResultPayload::Entity(
                Entity::new(id, EntityType::Concept, "org1").with_id(id),
            ),
        }
    }

    fn topic_result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            kind: ResultKind::Topic,
            payload: ResultPayload::Topic(TopicSummary {
                topic_id: id.to_string(),
                meeting_note_id: "n1".to_string(),
                title: id.to_string(),
                content_summary: String::new(),
                semantic_category: None,
                keywords: Vec::new(),
                organization_id: "org1".to_string(),
            }),
            ..entity_result(id, score)
        }
    }

    #[test]
    fn test_per_type_quota() {
        assert_eq!(per_type_quota(0), 0);
        assert_eq!(per_type_quota(1), 1);
        assert_eq!(per_type_quota(6), 2);
        assert_eq!(per_type_quota(7), 3);
        assert_eq!(per_type_quota(10), 4);
    }

    #[test]
    fn test_merge_sorted_and_truncated() {
        let merged = merge_results(
            vec![
                vec![entity_result("e1", 0.4), entity_result("e2", 0.9)],
                vec![],
                vec![topic_result("t1", 0.7), topic_result("t2", 0.1)],
            ],
            3,
        );
        let scores: Vec<f32> = merged.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.4]);

        let all = merge_results(vec![vec![entity_result("e1", 0.4)]], 10);
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_merge_dedupes_within_kind_only() {
        let merged = merge_results(
            vec![
                vec![entity_result("x", 0.3), entity_result("x", 0.8)],
                vec![topic_result("x", 0.5)],
            ],
            10,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].kind, ResultKind::Entity);
        assert_eq!(merged[0].score, 0.8);
        assert_eq!(merged[1].kind, ResultKind::Topic);
    }

    #[test]
    fn test_ties_break_on_kind_then_id() {
        let merged = merge_results(
            vec![
                vec![topic_result("a", 0.5)],
                vec![entity_result("b", 0.5), entity_result("a", 0.5)],
            ],
            10,
        );
        let order: Vec<(ResultKind, &str)> =
            merged.iter().map(|r| (r.kind, r.id.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (ResultKind::Entity, "a"),
                (ResultKind::Entity, "b"),
                (ResultKind::Topic, "a"),
            ]
        );
    }

    #[test]
    fn test_relation_display_name() {
        let relation = Relation::new("partners_with", "org1");
        let mut hit = RelationHit {
            relation,
            source_name: Some("Acme".to_string()),
            target_name: Some("Globex".to_string()),
        };
        assert_eq!(hit.display_name(), "partners_with: Acme → Globex");

        hit.source_name = None;
        hit.target_name = None;
        assert_eq!(hit.display_name(), "partners_with");
    }
}
