//! Query understanding: structured filter extraction and domain expansion.
//!
//! Questions are parsed with fixed, ordered rule tables rather than a learned
//! model, so every decision can be reproduced from the tables below.
//!
//! ## Steps
//!
//! 1. **Comparison intent**: questions that compare periods or places must see
//!    the whole corpus, so they never receive location, severity or year filters.
//! 2. **Location / severity**: the first matching phrase of each table adds one
//!    equality predicate.
//! 3. **Years**: every 2010–2029 year is recorded; exactly one distinct year
//!    (and no comparison) becomes a `year` predicate.
//! 4. **Expansion**: each triggered domain phrase is appended once, biasing the
//!    embedding toward vocabulary the question may not use verbatim.
//!
//! ## Example
//!
//! ```ignore
//! use incidex_core::query::QueryUnderstanding;
//!
//! let parsed = QueryUnderstanding::parse("What happened in Vancouver in 2023?");
//! // filter: {"$and": [{"city": "Vancouver"}, {"year": "2023"}]}
//! // facts:  {"location": "Vancouver", "years_mentioned": [2023], "year": "2023"}
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use incidex_db::vector::{FilterField, FilterValue, MetadataFilter};

// ============================================================================
// Rule Tables
// ============================================================================

const COMPARISON_MARKERS: &[&str] = &[
    "compare",
    "versus",
    " vs ",
    "difference",
    "before",
    "after",
    "then look",
    "changed",
    "trend",
    "between",
];

/// Location phrases in match priority order.
const LOCATION_PHRASES: &[(&str, FilterField, &str)] = &[
    ("vancouver", FilterField::City, "Vancouver"),
    ("trinidad tobago", FilterField::City, "Trinidad Tobago"),
    ("trinidad", FilterField::City, "Trinidad Tobago"),
    ("tobago", FilterField::City, "Trinidad Tobago"),
    ("working from home", FilterField::City, "Working Home"),
    ("work from home", FilterField::City, "Working Home"),
    ("wfh", FilterField::City, "Working Home"),
    ("remote", FilterField::City, "Working Home"),
    ("brussels", FilterField::City, "Brussels"),
    ("egypt", FilterField::Country, "Egypt"),
    ("new zealand", FilterField::Country, "New Zealand"),
    ("chile", FilterField::Country, "Chile"),
    ("usa", FilterField::Country, "Usa"),
    ("united states", FilterField::Country, "Usa"),
    ("canada", FilterField::Country, "Canada"),
];

enum SeverityTarget {
    Label(&'static str),
    HighRisk,
}

/// Severity phrases in match priority order.
const SEVERITY_PHRASES: &[(&str, SeverityTarget)] = &[
    ("major", SeverityTarget::Label("Major")),
    ("serious", SeverityTarget::Label("Serious")),
    (
        "potentially significant",
        SeverityTarget::Label("Potentially Significant"),
    ),
    ("near miss", SeverityTarget::Label("Near Miss")),
    ("minor", SeverityTarget::Label("Minor")),
    ("high risk", SeverityTarget::HighRisk),
    ("high-risk", SeverityTarget::HighRisk),
];

/// `(triggers, expansion phrase)`; a trigger matches as a substring.
const DOMAIN_EXPANSIONS: &[(&[&str], &str)] = &[
    (
        &["incident", "accident", "event", "what happened"],
        "safety incident near miss accident event occurrence",
    ),
    (
        &["cause", "why", "root", "reason"],
        "root cause failure reason contributing factor",
    ),
    (
        &["prevent", "lesson", "avoid", "recommendation", "action"],
        "lessons learned prevention corrective action recommendation",
    ),
    (
        &["contractor", "worker", "employee", "staff", "crew"],
        "contractor worker employee personnel crew technician",
    ),
    (
        &["ai", "machine learning", "model", "algorithm", "predictive"],
        "AI artificial intelligence machine learning predictive model failure",
    ),
    (
        &["cyber", "hack", "breach", "digital", "unauthorized"],
        "cybersecurity unauthorized access breach digital intrusion",
    ),
    (
        &["chemical", "vapor", "spill", "release", "exposure"],
        "chemical vapor release spill exposure toxic hazardous",
    ),
    (
        &["confined", "vessel", "tank", "entry", "space"],
        "confined space entry vessel permit work atmosphere",
    ),
    (
        &["valve", "isolation", "pressure", "line", "pipe", "fitting"],
        "valve isolation pressure line pipe fitting maintenance",
    ),
    (
        &["fall", "electric", "shock", "arc", "height", "ladder"],
        "fall height electrical shock arc flash energy",
    ),
    (
        &["trend", "change", "increase", "grow", "pattern", "over time"],
        "trend change increase growth pattern year over year comparison",
    ),
    (
        &["compare", "difference", "versus", "vs", "between", "before", "after"],
        "compare contrast difference versus comparison analysis period",
    ),
    (
        &["pre-shift", "briefing", "brief", "morning", "start of shift", "today"],
        "pre-shift briefing safety hazard watch for alert awareness",
    ),
    (
        &["pattern", "repeat", "recurring", "common", "frequent", "again"],
        "recurring pattern repeat systemic common frequent multiple incidents",
    ),
    (
        &["worst", "severe", "serious", "critical", "major", "priority"],
        "major serious critical high risk severe priority escalation",
    ),
];

/// Words that mark a question about what occurred.
pub const FACTUAL_KEYWORDS: &[&str] = &[
    "what", "happened", "describe", "explain", "detail", "incident", "occurred", "event",
    "accident",
];

/// Words that mark a question about prevention.
pub const LESSON_KEYWORDS: &[&str] = &[
    "prevent",
    "lesson",
    "recommendation",
    "avoid",
    "action",
    "corrective",
    "improve",
    "future",
    "should",
    "next time",
];

fn year_regex() -> &'static Regex {
    static YEAR_RE: OnceLock<Regex> = OnceLock::new();
    YEAR_RE.get_or_init(|| Regex::new(r"\b(201\d|202\d)\b").expect("year pattern is valid"))
}

// ============================================================================
// ParsedFacts
// ============================================================================

/// What the parser auto-detected, surfaced to the caller for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFacts {
    /// Title-cased matched location phrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Title-cased matched severity phrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Every distinct year in the question, ascending.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub years_mentioned: Vec<i32>,

    /// The single year used as a filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

impl ParsedFacts {
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.severity.is_none()
            && self.years_mentioned.is_empty()
            && self.year.is_none()
    }
}

// ============================================================================
// QueryUnderstanding
// ============================================================================

/// Result of parsing a raw question.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUnderstanding {
    /// Original question plus appended domain phrases.
    pub expanded_query: String,
    pub filter: Option<MetadataFilter>,
    pub facts: ParsedFacts,
    pub is_comparison: bool,
}

impl QueryUnderstanding {
    /// Parse a question. Pure and deterministic.
    pub fn parse(query: &str) -> Self {
        let lowered = query.to_lowercase();
        let is_comparison = COMPARISON_MARKERS.iter().any(|m| lowered.contains(m));

        let mut facts = ParsedFacts::default();
        let mut predicates = Vec::new();

        if !is_comparison {
            if let Some((phrase, field, value)) = LOCATION_PHRASES
                .iter()
                .find(|(phrase, _, _)| lowered.contains(phrase))
            {
                predicates.push(MetadataFilter::equals(*field, *value));
                facts.location = Some(phrase_title(phrase));
            }

            if let Some((phrase, target)) = SEVERITY_PHRASES
                .iter()
                .find(|(phrase, _)| lowered.contains(phrase))
            {
                let predicate = match target {
                    SeverityTarget::Label(label) => {
                        MetadataFilter::equals(FilterField::Severity, *label)
                    }
                    SeverityTarget::HighRisk => {
                        MetadataFilter::equals(FilterField::IsHighRisk, FilterValue::Int(1))
                    }
                };
                predicates.push(predicate);
                facts.severity = Some(phrase_title(phrase));
            }
        }

        let mut years: Vec<i32> = year_regex()
            .find_iter(&lowered)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        years.sort_unstable();
        years.dedup();

        if let [year] = years.as_slice() {
            if !is_comparison {
                let year = year.to_string();
                predicates.push(MetadataFilter::equals(FilterField::Year, year.as_str()));
                facts.year = Some(year);
            }
        }
        facts.years_mentioned = years;

        Self {
            expanded_query: expand_query(query, &lowered),
            filter: MetadataFilter::all_of(predicates),
            facts,
            is_comparison,
        }
    }
}

/// Append each triggered expansion phrase once, in table order.
fn expand_query(query: &str, lowered: &str) -> String {
    let mut phrases: Vec<&str> = Vec::new();
    for (triggers, phrase) in DOMAIN_EXPANSIONS {
        if triggers.iter().any(|t| lowered.contains(t)) && !phrases.contains(phrase) {
            phrases.push(phrase);
        }
    }

    if phrases.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, phrases.join(" "))
    }
}

fn phrase_title(phrase: &str) -> String {
    crate::dataset::title_case(phrase)
}

/// Whether whitespace-separated words of `lowered` intersect `keywords`.
pub fn has_intent(lowered: &str, keywords: &[&str]) -> bool {
    lowered
        .split_whitespace()
        .any(|word| keywords.contains(&word))
}
