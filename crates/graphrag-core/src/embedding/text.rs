//! Text preparation for embedding requests

use std::sync::OnceLock;

use regex::Regex;

/// Times the title is repeated in enhanced embedding text
const TITLE_REPEAT: usize = 3;

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

fn block_pattern() -> &'static Regex {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("static regex")
    })
}

/// Strip markup, decode common entities and trim.
///
/// Returns an empty string when nothing but markup and whitespace was present.
pub fn sanitize_text(input: &str) -> String {
    let without_blocks = block_pattern().replace_all(input, " ");
    let without_tags = tag_pattern().replace_all(&without_blocks, " ");

    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Structured metadata folded into topic embedding text
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMetadata<'a> {
    pub semantic_category: Option<&'a str>,
    pub keywords: &'a [String],
    pub tags: &'a [String],
    pub summary: Option<&'a str>,
}

/// Title repeated, then category, top-5 keywords, top-3 tags and summary, then content
pub fn build_enhanced_text(title: &str, content: &str, metadata: &EmbeddingMetadata<'_>) -> String {
    let weighted_title = vec![title; TITLE_REPEAT].join("\n");

    let mut parts: Vec<String> = Vec::new();
    if let Some(category) = metadata.semantic_category.filter(|c| !c.trim().is_empty()) {
        parts.push(category.to_string());
    }
    if !metadata.keywords.is_empty() {
        parts.push(join_top(metadata.keywords, 5, " "));
    }
    if !metadata.tags.is_empty() {
        parts.push(join_top(metadata.tags, 3, " "));
    }
    if let Some(summary) = metadata.summary.filter(|s| !s.trim().is_empty()) {
        parts.push(summary.to_string());
    }

    if parts.is_empty() {
        format!("{weighted_title}\n\n{content}")
    } else {
        format!("{weighted_title}\n\n{}\n\n{content}", parts.join("\n"))
    }
}

/// Metadata-only text: category, top-10 keywords, top-5 tags, summary.
///
/// `None` when there is no metadata to embed.
pub fn build_metadata_text(metadata: &EmbeddingMetadata<'_>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(category) = metadata.semantic_category.filter(|c| !c.trim().is_empty()) {
        parts.push(category.to_string());
    }
    parts.extend(metadata.keywords.iter().take(10).cloned());
    parts.extend(metadata.tags.iter().take(5).cloned());
    if let Some(summary) = metadata.summary.filter(|s| !s.trim().is_empty()) {
        parts.push(summary.to_string());
    }

    let text = parts.join("\n");
    if text.trim().is_empty() { None } else { Some(text) }
}

fn join_top(items: &[String], n: usize, sep: &str) -> String {
    items
        .iter()
        .take(n)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}

/// Lowercased alphanumeric tokens, shared by keyword scoring and the offline embedder
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
