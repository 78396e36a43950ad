//! Heuristic scoring of search candidates
//!
//! A candidate's score is the weighted sum of factors that each lie in [0, 1]:
//!
//! | factor          | source                                              |
//! |-----------------|-----------------------------------------------------|
//! | similarity      | normalized vector similarity                        |
//! | recency         | exponential decay on age of `updated_at`            |
//! | importance      | topic/entity importance tag, relation confidence    |
//! | keyword_match   | share of query tokens found in names/title/keywords |
//! | popularity      | log-scaled topic search count                       |
//! | category_match  | filter category equals the candidate's category     |
//!
//! Missing inputs contribute 0. Nothing here fails or logs; non-finite results
//! are coerced to 0 and the breakdown keeps the inputs.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::graph::{Entity, Importance, Relation, SearchFilters, Topic, TopicSummary};
use crate::embedding::text::tokenize;
use crate::error::{Error, Result};
use crate::vector::SimilarityScale;

/// Named coefficients of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub similarity: f32,
    pub recency: f32,
    pub importance: f32,
    pub keyword_match: f32,
    pub popularity: f32,
    pub category_match: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.55,
            recency: 0.10,
            importance: 0.10,
            keyword_match: 0.15,
            popularity: 0.05,
            category_match: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f32 {
        self.similarity
            + self.recency
            + self.importance
            + self.keyword_match
            + self.popularity
            + self.category_match
    }

    fn values(&self) -> [f32; 6] {
        [
            self.similarity,
            self.recency,
            self.importance,
            self.keyword_match,
            self.popularity,
            self.category_match,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.values().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if self.total() <= 0.0 {
            return Err(Error::Config("scoring weights must not all be zero".to_string()));
        }
        Ok(())
    }
}

/// Tunable scoring coefficients, stored in the `[scoring]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Age at which the recency factor halves
    pub recency_half_life_days: f64,
    /// Search count at which the popularity factor reaches 1
    pub usage_saturation: u32,
    /// Weight moved from similarity to keyword match for name-like queries
    pub proper_noun_shift: f32,
    /// Weight moved from similarity to recency for date-like queries
    pub date_shift: f32,
    /// Treat very short queries in caseless scripts (CJK names) as name-like
    pub caseless_name_queries: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            recency_half_life_days: 30.0,
            usage_saturation: 100,
            proper_noun_shift: 0.10,
            date_shift: 0.10,
            caseless_name_queries: false,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !(self.recency_half_life_days.is_finite() && self.recency_half_life_days > 0.0) {
            return Err(Error::Config(
                "scoring.recency_half_life_days must be positive".to_string(),
            ));
        }
        if self.usage_saturation == 0 {
            return Err(Error::Config("scoring.usage_saturation must be positive".to_string()));
        }
        for (name, shift) in [
            ("proper_noun_shift", self.proper_noun_shift),
            ("date_shift", self.date_shift),
        ] {
            if !(0.0..=1.0).contains(&shift) {
                return Err(Error::Config(format!("scoring.{name} must be within [0, 1]")));
            }
        }
        Ok(())
    }
}

/// Factor values that went into a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub similarity: f32,
    pub recency: f32,
    pub importance: f32,
    pub keyword_match: f32,
    pub popularity: f32,
    pub category_match: f32,
}

impl ScoreBreakdown {
    /// Compute weighted combined score
    pub fn combined(&self, weights: &ScoringWeights) -> f32 {
        self.similarity * weights.similarity
            + self.recency * weights.recency
            + self.importance * weights.importance
            + self.keyword_match * weights.keyword_match
            + self.popularity * weights.popularity
            + self.category_match * weights.category_match
    }
}

/// Composite score with its inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f32,
    pub breakdown: ScoreBreakdown,
}

impl Score {
    fn from_breakdown(breakdown: ScoreBreakdown, weights: &ScoringWeights) -> Self {
        let value = breakdown.combined(weights);
        Self {
            value: if value.is_finite() { value } else { 0.0 },
            breakdown,
        }
    }
}

/// Everything about one query that scoring needs, computed once per search
#[derive(Debug, Clone)]
pub struct QueryContext<'a> {
    pub weights: ScoringWeights,
    pub filters: &'a SearchFilters,
    pub tokens: Vec<String>,
    pub now: DateTime<Utc>,
}

/// The signals a topic contributes, from either a stored topic or index metadata
#[derive(Debug, Clone, Default)]
pub struct TopicSignals<'a> {
    pub title: &'a str,
    pub keywords: &'a [String],
    pub semantic_category: Option<&'a str>,
    pub importance: Option<Importance>,
    pub updated_at: Option<DateTime<Utc>>,
    pub search_count: u32,
}

impl<'a> From<&'a Topic> for TopicSignals<'a> {
    fn from(topic: &'a Topic) -> Self {
        Self {
            title: &topic.title,
            keywords: &topic.keywords,
            semantic_category: topic.semantic_category.as_deref(),
            importance: topic.importance,
            updated_at: topic.updated_at.or(topic.created_at),
            search_count: topic.search_count,
        }
    }
}

impl<'a> From<&'a TopicSummary> for TopicSignals<'a> {
    fn from(summary: &'a TopicSummary) -> Self {
        Self {
            title: &summary.title,
            keywords: &summary.keywords,
            semantic_category: summary.semantic_category.as_deref(),
            ..Default::default()
        }
    }
}

/// Map a raw index score onto [0, 1], higher is better. Non-finite input gives 0.
pub fn normalize_similarity(raw: f32, scale: SimilarityScale) -> f32 {
    if !raw.is_finite() {
        return 0.0;
    }
    let value = match scale {
        SimilarityScale::Unit => raw,
        SimilarityScale::Cosine => (raw + 1.0) / 2.0,
        SimilarityScale::Distance => 1.0 - raw / 2.0,
    };
    value.clamp(0.0, 1.0)
}

/// Ordinal to numeric
pub fn importance_factor(importance: Option<Importance>) -> f32 {
    match importance {
        Some(Importance::Low) => 0.33,
        Some(Importance::Medium) => 0.66,
        Some(Importance::High) => 1.0,
        None => 0.0,
    }
}

/// Exponential decay: 1 now, 0.5 after one half-life. Future timestamps count as now.
pub fn recency_factor(
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> f32 {
    let Some(timestamp) = timestamp else {
        return 0.0;
    };
    if half_life_days <= 0.0 {
        return 0.0;
    }
    let age_days = ((now - timestamp).num_seconds() as f64 / 86_400.0).max(0.0);
    let factor = (-std::f64::consts::LN_2 * age_days / half_life_days).exp();
    clamp_unit(factor as f32)
}

/// `ln(1 + n) / ln(1 + saturation)`, capped at 1
pub fn usage_factor(search_count: u32, saturation: u32) -> f32 {
    if search_count == 0 || saturation == 0 {
        return 0.0;
    }
    let value = (1.0 + search_count as f64).ln() / (1.0 + saturation as f64).ln();
    clamp_unit(value as f32)
}

/// Share of distinct query tokens present among the candidate's field tokens
pub fn keyword_overlap<'a, I>(query_tokens: &[String], fields: I) -> f32
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
    if wanted.is_empty() {
        return 0.0;
    }
    let present: HashSet<String> = fields.into_iter().flat_map(tokenize).collect();
    let hits = wanted.iter().filter(|t| present.contains(**t)).count();
    hits as f32 / wanted.len() as f32
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn date_pattern() -> &'static Regex {
    static DATES: OnceLock<Regex> = OnceLock::new();
    DATES.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \b\d{4}[-/.]\d{1,2}([-/.]\d{1,2})?\b
            | \b\d{1,2}/\d{1,2}\b
            | \b(19|20)\d{2}\b
            | \b(today|yesterday|tomorrow|recent|recently|latest|newest|current)\b
            | \b(last|this|next)\s+(week|month|quarter|year)\b
            | \b(jan(uary)?|feb(ruary)?|mar(ch)?|apr(il)?|may|june?|july?|aug(ust)?|sep(tember)?|oct(ober)?|nov(ember)?|dec(ember)?)\b
            | \b q[1-4] \b
            | \d{1,4}\s*(年|月|日)
            ",
        )
        .expect("static regex")
    })
}

/// Queries mentioning dates or recency words
pub fn is_date_query(query: &str) -> bool {
    date_pattern().is_match(query)
}

/// Longest caseless-script query still taken for a name
const CASELESS_NAME_MAX_CHARS: usize = 8;

/// Short queries made of capitalized words, e.g. "Acme" or "Jane Doe".
///
/// Relies on letter case, so scripts without case never match; see
/// [`is_caseless_name_query`].
pub fn is_proper_noun_query(query: &str) -> bool {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 {
        return false;
    }
    words.iter().all(|word| {
        let mut letters = word.chars().filter(|c| c.is_alphabetic());
        match letters.next() {
            Some(first) => first.is_uppercase(),
            None => false,
        }
    })
}

/// Short queries whose letters all come from scripts without case, e.g. "山田太郎"
pub fn is_caseless_name_query(query: &str) -> bool {
    let letters: Vec<char> = query.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty()
        && letters.len() <= CASELESS_NAME_MAX_CHARS
        && query.split_whitespace().count() <= 2
        && letters.iter().all(|c| !c.is_uppercase() && !c.is_lowercase())
}

/// Computes composite scores under one [`ScoringConfig`]
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    scale: SimilarityScale,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), SimilarityScale::default())
    }
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, scale: SimilarityScale) -> Self {
        Self { config, scale }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn scale(&self) -> SimilarityScale {
        self.scale
    }

    pub fn normalize_similarity(&self, raw: f32) -> f32 {
        normalize_similarity(raw, self.scale)
    }

    /// Derive query weights from `base`; pure, the base is not touched.
    ///
    /// Name-like queries move weight from similarity to keyword match; date-like
    /// queries move weight from similarity to recency. The total is preserved.
    pub fn adjust_weights_for_query(&self, query: &str, base: &ScoringWeights) -> ScoringWeights {
        let mut weights = *base;
        let date_like = is_date_query(query);

        // case-based detection misses caseless scripts unless opted in
        let name_like = is_proper_noun_query(query)
            || (self.config.caseless_name_queries && is_caseless_name_query(query));
        if name_like && !date_like {
            let shift = self.config.proper_noun_shift.min(weights.similarity);
            weights.similarity -= shift;
            weights.keyword_match += shift;
        }
        if date_like {
            let shift = self.config.date_shift.min(weights.similarity);
            weights.similarity -= shift;
            weights.recency += shift;
        }
        weights
    }

    /// Per-query context with adapted weights and a fixed clock
    pub fn query_context<'a>(
        &self,
        query: &str,
        filters: &'a SearchFilters,
        now: DateTime<Utc>,
    ) -> QueryContext<'a> {
        QueryContext {
            weights: self.adjust_weights_for_query(query, &self.config.weights),
            filters,
            tokens: tokenize(query),
            now,
        }
    }

    pub fn calculate_entity_score(
        &self,
        ctx: &QueryContext<'_>,
        normalized_similarity: f32,
        entity: &Entity,
    ) -> Score {
        let category_match = match &ctx.filters.entity_type {
            Some(wanted) if wanted == &entity.entity_type => 1.0,
            _ => 0.0,
        };
        let breakdown = ScoreBreakdown {
            similarity: clamp_unit(normalized_similarity),
            recency: recency_factor(
                entity.updated_at.or(entity.created_at),
                ctx.now,
                self.config.recency_half_life_days,
            ),
            importance: importance_factor(entity.metadata.importance),
            keyword_match: keyword_overlap(&ctx.tokens, entity.names()),
            popularity: 0.0,
            category_match,
        };
        Score::from_breakdown(breakdown, &ctx.weights)
    }

    /// Endpoint names are optional; unresolved ends simply add no keywords
    pub fn calculate_relation_score(
        &self,
        ctx: &QueryContext<'_>,
        normalized_similarity: f32,
        relation: &Relation,
        source_name: Option<&str>,
        target_name: Option<&str>,
    ) -> Score {
        let category_match = match &ctx.filters.relation_type {
            Some(wanted) if wanted.eq_ignore_ascii_case(&relation.relation_type) => 1.0,
            _ => 0.0,
        };
        let fields = [
            Some(relation.relation_type.as_str()),
            relation.description.as_deref(),
            source_name,
            target_name,
        ];
        let breakdown = ScoreBreakdown {
            similarity: clamp_unit(normalized_similarity),
            recency: recency_factor(
                relation.updated_at.or(relation.created_at),
                ctx.now,
                self.config.recency_half_life_days,
            ),
            importance: relation.confidence.map(clamp_unit).unwrap_or(0.0),
            keyword_match: keyword_overlap(&ctx.tokens, fields.into_iter().flatten()),
            popularity: 0.0,
            category_match,
        };
        Score::from_breakdown(breakdown, &ctx.weights)
    }

    pub fn calculate_topic_score(
        &self,
        ctx: &QueryContext<'_>,
        normalized_similarity: f32,
        topic: &TopicSignals<'_>,
    ) -> Score {
        let category_match = match (&ctx.filters.topic_semantic_category, topic.semantic_category) {
            (Some(wanted), Some(category)) if wanted.eq_ignore_ascii_case(category) => 1.0,
            _ => 0.0,
        };
        let fields = std::iter::once(topic.title).chain(topic.keywords.iter().map(String::as_str));
        let breakdown = ScoreBreakdown {
            similarity: clamp_unit(normalized_similarity),
            recency: recency_factor(topic.updated_at, ctx.now, self.config.recency_half_life_days),
            importance: importance_factor(topic.importance),
            keyword_match: keyword_overlap(&ctx.tokens, fields),
            popularity: usage_factor(topic.search_count, self.config.usage_saturation),
            category_match,
        };
        Score::from_breakdown(breakdown, &ctx.weights)
    }
}
