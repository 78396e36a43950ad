//! Topics extracted from meeting notes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters of content used when a topic has no summary
const SUMMARY_FALLBACK_CHARS: usize = 200;

/// Separator between meeting note and topic in vector record ids
const RECORD_ID_SEPARATOR: &str = "-topic-";

/// Identity of a topic: the same topic id can repeat across meeting notes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicKey {
    pub topic_id: String,
    pub meeting_note_id: String,
}

impl TopicKey {
    pub fn new(topic_id: impl Into<String>, meeting_note_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            meeting_note_id: meeting_note_id.into(),
        }
    }

    /// Id under which the topic's embedding is stored: `{meeting_note_id}-topic-{topic_id}`
    pub fn record_id(&self) -> String {
        format!("{}{}{}", self.meeting_note_id, RECORD_ID_SEPARATOR, self.topic_id)
    }

    /// Inverse of [`record_id`](Self::record_id)
    pub fn parse_record_id(id: &str) -> Option<Self> {
        let (meeting_note_id, topic_id) = id.split_once(RECORD_ID_SEPARATOR)?;
        if meeting_note_id.is_empty() || topic_id.is_empty() {
            return None;
        }
        Some(Self::new(topic_id, meeting_note_id))
    }
}

impl std::fmt::Display for TopicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.record_id())
    }
}

/// Ordinal importance tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "mid" | "normal" => Some(Self::Medium),
            "high" | "critical" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of discussion content tied to a meeting note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub meeting_note_id: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub semantic_category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub importance: Option<Importance>,
    pub organization_id: String,
    /// How often the topic was returned by searches
    #[serde(default)]
    pub search_count: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Topic {
    pub fn new(
        key: TopicKey,
        title: impl Into<String>,
        content: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            topic_id: key.topic_id,
            meeting_note_id: key.meeting_note_id,
            title: title.into(),
            content: content.into(),
            summary: None,
            semantic_category: None,
            keywords: Vec::new(),
            tags: Vec::new(),
            importance: None,
            organization_id: organization_id.into(),
            search_count: 0,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn key(&self) -> TopicKey {
        TopicKey::new(&self.topic_id, &self.meeting_note_id)
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.semantic_category = Some(category.into());
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Summary if present, else the head of the content
    pub fn content_summary(&self) -> String {
        match self.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(summary) => summary.to_string(),
            None => self.content.chars().take(SUMMARY_FALLBACK_CHARS).collect(),
        }
    }
}

/// Projection of a topic carried in search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic_id: String,
    pub meeting_note_id: String,
    pub title: String,
    pub content_summary: String,
    pub semantic_category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub organization_id: String,
}

impl TopicSummary {
    pub fn key(&self) -> TopicKey {
        TopicKey::new(&self.topic_id, &self.meeting_note_id)
    }
}

impl From<&Topic> for TopicSummary {
    fn from(topic: &Topic) -> Self {
        Self {
            topic_id: topic.topic_id.clone(),
            meeting_note_id: topic.meeting_note_id.clone(),
            title: topic.title.clone(),
            content_summary: topic.content_summary(),
            semantic_category: topic.semantic_category.clone(),
            keywords: topic.keywords.clone(),
            organization_id: topic.organization_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_round_trip() {
        let key = TopicKey::new("t1", "note-42");
        assert_eq!(key.record_id(), "note-42-topic-t1");
        assert_eq!(TopicKey::parse_record_id("note-42-topic-t1"), Some(key));
        assert_eq!(TopicKey::parse_record_id("no-separator"), None);
        assert_eq!(TopicKey::parse_record_id("-topic-t1"), None);
    }

    #[test]
    fn test_same_topic_id_in_different_notes_differs() {
        assert_ne!(TopicKey::new("t1", "a"), TopicKey::new("t1", "b"));
    }

    #[test]
    fn test_importance_ordering_and_parse() {
        assert!(Importance::High > Importance::Medium);
        assert!(Importance::Medium > Importance::Low);
        assert_eq!(Importance::parse("HIGH"), Some(Importance::High));
        assert_eq!(Importance::parse("unknown"), None);
    }

    #[test]
    fn test_content_summary_fallback() {
        let long = "x".repeat(500);
        let topic = Topic::new(TopicKey::new("t1", "n1"), "Budget", long, "org1");
        assert_eq!(topic.content_summary().chars().count(), 200);

        let topic = topic.with_summary("Budget review");
        assert_eq!(topic.content_summary(), "Budget review");
    }

    #[test]
    fn test_summary_projection() {
        let topic = Topic::new(TopicKey::new("t1", "n1"), "Budget", "Q3 numbers", "org1")
            .with_category("finance")
            .with_keywords(vec!["budget".into()]);
        let summary = TopicSummary::from(&topic);

        assert_eq!(summary.key(), topic.key());
        assert_eq!(summary.content_summary, "Q3 numbers");
        assert_eq!(summary.semantic_category.as_deref(), Some("finance"));
    }
}
