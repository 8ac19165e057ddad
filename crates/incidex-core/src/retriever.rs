//! Hybrid retrieval: filtered search with sparse-result blending, then
//! rerank and per-record dedup.
//!
//! ## Flow
//!
//! 1. Parse the question (unless disabled); an explicit caller filter wins
//!    over the parsed one
//! 2. Embed the expanded question once
//! 3. Over-fetch `min(n * overfetchFactor, maxCandidates)` candidates
//! 4. Filtered search; fewer than `blendThreshold` hits blends in unfiltered
//!    hits from records not already present
//! 5. Rerank: `semantic * w_s + keyword * w_k + section boost`
//! 6. Keep the best chunk per record, truncate to `n`

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use incidex_db::vector::{ChunkCollection, ChunkMatch, ChunkMetadata, MetadataFilter};
use incidex_model::EmbeddingModel;

use crate::chunking::{SECTION_LESSONS, SECTION_WHAT_HAPPENED};
use crate::config::RetrievalConfig;
use crate::errors::IncidexResult;
use crate::model_adapter::IntoIncidexResult;
use crate::query::{has_intent, ParsedFacts, QueryUnderstanding, FACTUAL_KEYWORDS, LESSON_KEYWORDS};

/// Words never counted as keyword overlap.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "in", "of", "to", "and", "for", "on", "at", "by", "with", "this",
    "that", "are", "was", "were", "be", "been", "have", "has", "had", "do", "did", "what", "how",
    "why", "when", "where", "which", "who",
];

// ============================================================================
// RetrieveOptions
// ============================================================================

/// Options for a retrieval call.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Results to return (None = `retrieval.defaultResults`).
    pub n_results: Option<usize>,

    /// Explicit filter; replaces the one parsed from the question.
    pub filter: Option<MetadataFilter>,

    /// Run query understanding (filters + expansion).
    pub auto_parse: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            n_results: None,
            filter: None,
            auto_parse: true,
        }
    }
}

impl RetrieveOptions {
    pub fn with_results(mut self, n: usize) -> Self {
        self.n_results = Some(n);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Embed the raw question and skip filter extraction.
    pub fn without_parse(mut self) -> Self {
        self.auto_parse = false;
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// A ranked excerpt. `score` orders results; it is not a probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

impl ScoredHit {
    /// Candidate scored by vector similarity alone.
    pub fn from_match(m: ChunkMatch) -> Self {
        Self {
            score: round4(f64::from(m.similarity())),
            id: m.id,
            text: m.text,
            metadata: m.metadata,
        }
    }

    pub fn report_id(&self) -> &str {
        &self.metadata.report_id
    }
}

/// Output of a retrieval call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub hits: Vec<ScoredHit>,
    pub facts: ParsedFacts,
    /// Text that was embedded.
    pub expanded_query: String,
    /// Filter applied to the first search, in document form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// Size of the pool before rerank and dedup.
    pub candidate_count: usize,
    /// Whether unfiltered candidates were blended in.
    pub blended: bool,
}

/// Outcome of the filtered search.
#[derive(Debug)]
pub enum FilterOutcome {
    Hits(Vec<ScoredHit>),
    Empty,
    /// The store could not evaluate the filter.
    Rejected(String),
}

impl FilterOutcome {
    fn into_hits(self) -> Vec<ScoredHit> {
        match self {
            FilterOutcome::Hits(hits) => hits,
            FilterOutcome::Empty | FilterOutcome::Rejected(_) => Vec::new(),
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// Runs retrieval against one collection generation.
pub struct Retriever<'a> {
    collection: &'a dyn ChunkCollection,
    embedder: &'a dyn EmbeddingModel,
    config: &'a RetrievalConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        collection: &'a dyn ChunkCollection,
        embedder: &'a dyn EmbeddingModel,
        config: &'a RetrievalConfig,
    ) -> Self {
        Self {
            collection,
            embedder,
            config,
        }
    }

    /// Retrieve ranked, deduplicated hits for a question.
    ///
    /// An empty candidate pool is a valid empty result, not an error.
    pub fn retrieve(&self, query: &str, opts: &RetrieveOptions) -> IncidexResult<RetrievalResult> {
        let n_results = opts.n_results.unwrap_or(self.config.default_results);
        let candidates_n = self.config.candidate_count(n_results);

        let (expanded_query, parsed_filter, facts) = if opts.auto_parse {
            let parsed = QueryUnderstanding::parse(query);
            (parsed.expanded_query, parsed.filter, parsed.facts)
        } else {
            (query.to_string(), None, ParsedFacts::default())
        };
        let filter = opts.filter.clone().or(parsed_filter);

        let embedding = self.embedder.embed_one(&expanded_query).into_incidex_result()?;

        let filtered = match &filter {
            Some(f) => self.filtered_search(&embedding, candidates_n, f),
            None => FilterOutcome::Empty,
        };

        let mut blended = false;
        let candidates = match filtered {
            FilterOutcome::Hits(hits) if hits.len() >= self.config.blend_threshold => hits,
            outcome => {
                let filtered_hits = outcome.into_hits();
                let unfiltered = self.unfiltered_search(&embedding, candidates_n);
                if filtered_hits.is_empty() {
                    unfiltered
                } else {
                    blended = true;
                    blend_candidates(filtered_hits, unfiltered, candidates_n)
                }
            }
        };

        let candidate_count = candidates.len();
        let hits = if candidates.is_empty() {
            warn!("No candidates returned; index may be empty");
            Vec::new()
        } else {
            let hits = rerank_and_dedup(candidates, &expanded_query, n_results, self.config);
            info!("retrieve: {} candidates -> {} final hits", candidate_count, hits.len());
            hits
        };

        Ok(RetrievalResult {
            hits,
            facts,
            expanded_query,
            filter: filter.as_ref().map(MetadataFilter::to_json),
            candidate_count,
            blended,
        })
    }

    fn filtered_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> FilterOutcome {
        match self.collection.query(embedding, limit, Some(filter)) {
            Ok(matches) if matches.is_empty() => {
                debug!("Filter {} matched nothing", filter.to_json());
                FilterOutcome::Empty
            }
            Ok(matches) => FilterOutcome::Hits(matches.into_iter().map(ScoredHit::from_match).collect()),
            Err(e) => {
                warn!("Filtered query failed, using unfiltered only: {}", e);
                FilterOutcome::Rejected(e.to_string())
            }
        }
    }

    fn unfiltered_search(&self, embedding: &[f32], limit: usize) -> Vec<ScoredHit> {
        match self.collection.query(embedding, limit, None) {
            Ok(matches) => matches.into_iter().map(ScoredHit::from_match).collect(),
            Err(e) => {
                warn!("Unfiltered query failed: {}", e);
                Vec::new()
            }
        }
    }
}

// ============================================================================
// Blending / Reranking
// ============================================================================

/// Filtered hits first, then unfiltered hits from other records, up to `limit`.
///
/// Filtered hits are always kept in full.
pub fn blend_candidates(
    filtered: Vec<ScoredHit>,
    unfiltered: Vec<ScoredHit>,
    limit: usize,
) -> Vec<ScoredHit> {
    let filtered_ids: HashSet<String> = filtered.iter().map(|h| h.report_id().to_string()).collect();
    let room = limit.saturating_sub(filtered.len());

    let extra: Vec<ScoredHit> = unfiltered
        .into_iter()
        .filter(|h| !filtered_ids.contains(h.report_id()))
        .collect();

    info!(
        "Blended {} filtered + {} unfiltered candidates",
        filtered.len(),
        extra.len().min(room)
    );

    let mut pool = filtered;
    pool.extend(extra.into_iter().take(room));
    pool
}

/// Meaningful lower-case words of the query: alphabetic runs longer than two
/// characters that are not stop words.
pub fn keyword_terms(query: &str) -> BTreeSet<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_ascii_lowercase())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Fraction of `terms` found as substrings of the lower-cased text.
pub fn keyword_score(terms: &BTreeSet<String>, text: &str, min_terms: usize) -> f64 {
    if terms.is_empty() || terms.len() < min_terms {
        return 0.0;
    }
    let lowered = text.to_lowercase();
    let found = terms.iter().filter(|t| lowered.contains(t.as_str())).count();
    found as f64 / terms.len() as f64
}

/// Boost when a factual question meets "What Happened" or a prevention
/// question meets "Lessons & Prevention".
pub fn section_boost(lowered_query: &str, section: &str, boost: f64) -> f64 {
    let matches = (section == SECTION_WHAT_HAPPENED && has_intent(lowered_query, FACTUAL_KEYWORDS))
        || (section == SECTION_LESSONS && has_intent(lowered_query, LESSON_KEYWORDS));
    if matches {
        boost
    } else {
        0.0
    }
}

/// Weighted final score, rounded to 4 decimals.
pub fn combine_scores(semantic: f64, keyword: f64, boost: f64, config: &RetrievalConfig) -> f64 {
    round4(config.semantic_weight * semantic + config.keyword_weight * keyword + boost)
}

/// Rescore every candidate, keep the best chunk per record, truncate to `n`.
///
/// Ties keep encounter order (stable sort, first seen wins).
pub fn rerank_and_dedup(
    candidates: Vec<ScoredHit>,
    expanded_query: &str,
    n_results: usize,
    config: &RetrievalConfig,
) -> Vec<ScoredHit> {
    let lowered = expanded_query.to_lowercase();
    let terms = keyword_terms(expanded_query);

    let mut scored: Vec<ScoredHit> = candidates
        .into_iter()
        .map(|mut hit| {
            let kw = keyword_score(&terms, &hit.text, config.min_keyword_terms);
            let boost = section_boost(&lowered, &hit.metadata.section, config.section_boost);
            hit.score = combine_scores(hit.score, kw, boost, config);
            hit
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped: Vec<ScoredHit> = scored
        .into_iter()
        .filter(|hit| seen.insert(hit.report_id().to_string()))
        .collect();

    deduped.truncate(n_results);
    deduped
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, report: &str, section: &str, text: &str, score: f64) -> ScoredHit {
        ScoredHit {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                report_id: report.to_string(),
                section: section.to_string(),
                ..Default::default()
            },
            score,
        }
    }

    #[test]
    fn test_keyword_terms_drop_stop_and_short_words() {
        let terms = keyword_terms("What is the ROOT cause of a gas leak?");
        let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
        assert_eq!(terms, vec!["cause", "gas", "leak", "root"]);
    }

    #[test]
    fn test_keyword_score() {
        let terms = keyword_terms("valve leak flange");
        assert!((keyword_score(&terms, "A VALVE began to leak", 2) - 2.0 / 3.0).abs() < 1e-9);

        let single = keyword_terms("valve");
        assert_eq!(keyword_score(&single, "valve", 2), 0.0);
    }

    #[test]
    fn test_section_boost() {
        assert_eq!(section_boost("what happened here", "What Happened", 0.05), 0.05);
        assert_eq!(section_boost("what happened here", "Root Cause", 0.05), 0.0);
        assert_eq!(section_boost("how to prevent it", "Lessons & Prevention", 0.05), 0.05);
        assert_eq!(section_boost("how to prevent it", "What Happened", 0.05), 0.0);
    }

    #[test]
    fn test_combine_scores_rounding_and_monotonic() {
        let config = RetrievalConfig::default();
        assert_eq!(combine_scores(0.5, 0.5, 0.05, &config), 0.55);
        assert_eq!(combine_scores(0.123456, 0.0, 0.0, &config), 0.0864);

        let grid = [0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0];
        for &kw in &grid {
            for pair in grid.windows(2) {
                assert!(combine_scores(pair[0], kw, 0.0, &config) <= combine_scores(pair[1], kw, 0.0, &config));
                assert!(combine_scores(kw, pair[0], 0.05, &config) <= combine_scores(kw, pair[1], 0.05, &config));
            }
        }
    }

    #[test]
    fn test_dedup_keeps_best_chunk_per_record() {
        let config = RetrievalConfig::default();
        let candidates = vec![
            hit("rec1_what_happened", "1", "What Happened", "", 0.40),
            hit("rec1_causal_factors", "1", "Causal Factors", "", 0.90),
            hit("rec2_what_happened", "2", "What Happened", "", 0.60),
            hit("rec1_why_did_it_happen", "1", "Root Cause", "", 0.50),
        ];
        let out = rerank_and_dedup(candidates, "xyz", 10, &config);
        let ids: Vec<&str> = out.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["rec1_causal_factors", "rec2_what_happened"]);
        assert_eq!(out[0].score, 0.63);
    }

    #[test]
    fn test_dedup_ties_keep_first_seen() {
        let config = RetrievalConfig::default();
        let candidates = vec![
            hit("rec3_a", "3", "Root Cause", "", 0.5),
            hit("rec3_b", "3", "Root Cause", "", 0.5),
        ];
        let out = rerank_and_dedup(candidates, "xyz", 5, &config);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "rec3_a");
    }

    #[test]
    fn test_truncates_to_n() {
        let config = RetrievalConfig::default();
        let candidates = (0..6)
            .map(|i| hit(&format!("rec{}_x", i), &i.to_string(), "Root Cause", "", 0.1 * i as f64))
            .collect();
        let out = rerank_and_dedup(candidates, "xyz", 3, &config);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].report_id(), "5");
    }

    #[test]
    fn test_blend_keeps_filtered_and_skips_their_records() {
        let filtered = vec![hit("rec1_a", "1", "", "", 0.3)];
        let unfiltered = vec![
            hit("rec1_b", "1", "", "", 0.9),
            hit("rec2_a", "2", "", "", 0.8),
            hit("rec3_a", "3", "", "", 0.7),
            hit("rec4_a", "4", "", "", 0.6),
        ];
        let pool = blend_candidates(filtered, unfiltered, 3);
        let ids: Vec<&str> = pool.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["rec1_a", "rec2_a", "rec3_a"]);
    }

    #[test]
    fn test_blend_never_drops_filtered_hits() {
        let filtered = vec![hit("rec1_a", "1", "", "", 0.3), hit("rec2_a", "2", "", "", 0.2)];
        let pool = blend_candidates(filtered, Vec::new(), 1);
        assert_eq!(pool.len(), 2);
    }
}
