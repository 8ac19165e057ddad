//! Grounding context for the answer step.
//!
//! Formats ranked hits into numbered source blocks and citation summaries.
//! The language-model call itself lives outside this crate.

use serde::{Deserialize, Serialize};

use crate::query::ParsedFacts;
use crate::retriever::ScoredHit;

/// Separator between source blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Citation entry for UI source lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub record_id: String,
    pub title: String,
    pub severity: String,
    pub section: String,
    pub location: String,
    pub year: String,
    pub score: f64,
}

impl SourceSummary {
    pub fn from_hit(hit: &ScoredHit) -> Self {
        let m = &hit.metadata;
        Self {
            record_id: m.report_id.clone(),
            title: m.title.clone(),
            severity: m.severity.clone(),
            section: m.section.clone(),
            location: short_location(hit).to_string(),
            year: m.year.clone(),
            score: hit.score,
        }
    }
}

/// Summaries for every hit, in rank order.
pub fn summarize_sources(hits: &[ScoredHit]) -> Vec<SourceSummary> {
    hits.iter().map(SourceSummary::from_hit).collect()
}

/// One `SOURCE n [...]` block per hit, bodies cut to `max_body_chars`.
pub fn format_context(hits: &[ScoredHit], max_body_chars: usize) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let m = &hit.metadata;
            format!(
                "SOURCE {} [#{} | {} | {} | {} | {}]\nTitle: {}\n{}",
                i + 1,
                m.report_id,
                m.severity,
                short_location(hit),
                m.year,
                m.section,
                m.title,
                body_excerpt(&hit.text, max_body_chars)
            )
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// `\n\n[Auto-detected filters: {...}]`, or empty when nothing was detected.
pub fn auto_detected_note(facts: &ParsedFacts) -> String {
    if facts.is_empty() {
        return String::new();
    }
    match serde_json::to_string(facts) {
        Ok(json) => format!("\n\n[Auto-detected filters: {}]", json),
        Err(_) => String::new(),
    }
}

/// User turn handed to the language model: sources, detected filters, question.
pub fn build_user_prompt(
    question: &str,
    hits: &[ScoredHit],
    facts: &ParsedFacts,
    max_body_chars: usize,
) -> String {
    format!(
        "Source records:\n\n{}{}{}Question: {}",
        format_context(hits, max_body_chars),
        auto_detected_note(facts),
        BLOCK_SEPARATOR,
        question
    )
}

fn short_location(hit: &ScoredHit) -> &str {
    let m = &hit.metadata;
    [m.city.as_str(), m.country.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("Unknown")
}

/// Narrative after the header block, at most `max_chars` characters.
fn body_excerpt(text: &str, max_chars: usize) -> &str {
    let body = text.split_once("\n\n").map_or(text, |(_, rest)| rest);
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
