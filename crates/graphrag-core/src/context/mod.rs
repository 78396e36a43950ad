//! Prompt context assembly
//!
//! Renders ranked search results into a markdown block for LLM prompting,
//! grouped as entities, relations, then topics, and keeps the estimated token
//! count within a budget. Each rendered item is also listed in `sources`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::graph::{Entity, TopicSummary};
use crate::search::{RelationHit, ResultKind, SearchResult};

/// Estimated tokens per character
pub const TOKENS_PER_CHAR: f64 = 0.25;
/// Appended after a cut; not counted against the budget
pub const TRUNCATION_NOTICE: &str = "(context truncated: too long, some content omitted)";

const DEFAULT_SUMMARY_CHARS: usize = 800;
const DEFAULT_RECENT_DAYS: i64 = 30;

/// One item that contributed to the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub kind: ResultKind,
    pub id: String,
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    pub context: String,
    pub sources: Vec<Source>,
    pub truncated: bool,
}

impl ContextResult {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.sources.is_empty()
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 * TOKENS_PER_CHAR).ceil() as usize
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    summary_chars: usize,
    recent_days: i64,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            summary_chars: DEFAULT_SUMMARY_CHARS,
            recent_days: DEFAULT_RECENT_DAYS,
        }
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest topic summary rendered before it is cut with "..."
    pub fn with_summary_chars(mut self, chars: usize) -> Self {
        self.summary_chars = chars;
        self
    }

    /// Entities updated within this many days get an "updated" line
    pub fn with_recent_days(mut self, days: i64) -> Self {
        self.recent_days = days;
        self
    }

    pub fn build_context(&self, results: &[SearchResult], max_tokens: usize) -> ContextResult {
        self.build_context_at(results, max_tokens, Utc::now())
    }

    /// Render against a fixed clock
    pub fn build_context_at(
        &self,
        results: &[SearchResult],
        max_tokens: usize,
        now: DateTime<Utc>,
    ) -> ContextResult {
        if results.is_empty() {
            return ContextResult::default();
        }

        let mut lines: Vec<String> = Vec::new();
        let mut sources = Vec::with_capacity(results.len());

        let entities: Vec<(&SearchResult, &Entity)> = results
            .iter()
            .filter_map(|r| r.entity().map(|e| (r, e)))
            .collect();
        if !entities.is_empty() {
            lines.push("## Related entities\n".to_string());
            for (result, entity) in entities {
                self.render_entity(&mut lines, result.score, entity, now);
                sources.push(Source {
                    kind: ResultKind::Entity,
                    id: entity.id.clone(),
                    name: entity.name.clone(),
                    score: finite_or_zero(result.score),
                });
            }
        }

        let relations: Vec<(&SearchResult, &RelationHit)> = results
            .iter()
            .filter_map(|r| r.relation().map(|h| (r, h)))
            .collect();
        if !relations.is_empty() {
            lines.push("\n## Related relations\n".to_string());
            for (result, hit) in relations {
                render_relation(&mut lines, result.score, hit);
                sources.push(Source {
                    kind: ResultKind::Relation,
                    id: hit.relation.id.clone(),
                    name: hit.display_name(),
                    score: finite_or_zero(result.score),
                });
            }
        }

        let topics: Vec<(&SearchResult, &TopicSummary)> = results
            .iter()
            .filter_map(|r| r.topic().map(|t| (r, t)))
            .collect();
        if !topics.is_empty() {
            lines.push("\n## Related topics\n".to_string());
            for (result, topic) in topics {
                self.render_topic(&mut lines, result.score, topic);
                sources.push(Source {
                    kind: ResultKind::Topic,
                    id: result.id.clone(),
                    name: topic.title.clone(),
                    score: finite_or_zero(result.score),
                });
            }
        }

        let (context, truncated) = fit_to_budget(lines.join("\n"), max_tokens);
        ContextResult {
            context,
            sources,
            truncated,
        }
    }

    fn render_entity(&self, lines: &mut Vec<String>, score: f32, entity: &Entity, now: DateTime<Utc>) {
        lines.push(format!(
            "- **{}** ({}){}",
            entity.name,
            entity.entity_type,
            relevance(score)
        ));
        if !entity.aliases.is_empty() {
            lines.push(format!("  Aliases: {}", entity.aliases.join(", ")));
        }
        for (field, value) in entity.metadata.known_fields() {
            lines.push(format!("  {}: {value}", field_label(field)));
        }
        if let Some(updated_at) = entity.updated_at {
            let days = (now - updated_at).num_days();
            if (0..self.recent_days).contains(&days) {
                lines.push(format!("  Last updated: {days} days ago"));
            }
        }
    }

    fn render_topic(&self, lines: &mut Vec<String>, score: f32, topic: &TopicSummary) {
        lines.push(format!("- **{}**{}", topic.title, relevance(score)));
        if !topic.content_summary.is_empty() {
            let summary = if topic.content_summary.chars().count() > self.summary_chars {
                let head: String = topic.content_summary.chars().take(self.summary_chars).collect();
                format!("{head}...")
            } else {
                topic.content_summary.clone()
            };
            lines.push(format!("  Summary: {summary}"));
        }
        if let Some(category) = &topic.semantic_category {
            lines.push(format!("  Category: {category}"));
        }
        if !topic.keywords.is_empty() {
            lines.push(format!("  Keywords: {}", topic.keywords.join(", ")));
        }
    }
}

fn render_relation(lines: &mut Vec<String>, score: f32, hit: &RelationHit) {
    let relation = &hit.relation;
    lines.push(format!("- **{}**{}", relation.relation_type, relevance(score)));

    match (&hit.source_name, &hit.target_name) {
        (Some(source), Some(target)) => lines.push(format!("  {source} → {target}")),
        (Some(source), None) => lines.push(format!("  Source: {source}")),
        (None, Some(target)) => lines.push(format!("  Target: {target}")),
        (None, None) => {}
    }
    if let Some(description) = &relation.description {
        lines.push(format!("  Description: {description}"));
    }
    if let Some(confidence) = relation.confidence {
        lines.push(format!("  Confidence: {:.1}%", confidence * 100.0));
    }
    if let Some(strength) = relation.metadata.strength {
        lines.push(format!("  Strength: {strength}"));
    }
    if let Some(direction) = &relation.metadata.direction {
        lines.push(format!("  Direction: {direction}"));
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "description" => "Description",
        "url" => "URL",
        "location" => "Location",
        "industry" => "Industry",
        "role" => "Role",
        "department" => "Department",
        other => other,
    }
}

fn relevance(score: f32) -> String {
    if score.is_finite() {
        format!(" (relevance: {:.1}%)", score * 100.0)
    } else {
        String::new()
    }
}

fn finite_or_zero(score: f32) -> f32 {
    if score.is_finite() { score } else { 0.0 }
}

/// Hard cut at the character offset matching `max_tokens`, then the notice
fn fit_to_budget(context: String, max_tokens: usize) -> (String, bool) {
    let chars = context.chars().count();
    if chars as f64 * TOKENS_PER_CHAR <= max_tokens as f64 {
        return (context, false);
    }
    let max_chars = (max_tokens as f64 / TOKENS_PER_CHAR).floor() as usize;
    let mut cut: String = context.chars().take(max_chars).collect();
    cut.push_str("\n\n");
    cut.push_str(TRUNCATION_NOTICE);
    (cut, true)
}
