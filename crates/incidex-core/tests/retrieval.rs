//! End-to-end retrieval tests: filter extraction, blending, caller filters,
//! rejected filters and per-record dedup.

mod common;

use std::collections::HashSet;

use incidex_core::{format_context, IncidexError, RetrieveOptions};
use incidex_db::vector::{FilterField, MetadataFilter};
use serde_json::json;

use common::{hit_records, incidents_csv, Fixture};

fn ready_engine() -> (Fixture, incidex_core::EngineContext) {
    let fixture = Fixture::new();
    fixture.write_dataset(&incidents_csv());
    let engine = fixture.engine();
    engine.initialize(false).unwrap();
    (fixture, engine)
}

#[test]
fn test_location_and_year_become_a_conjunction() {
    let (_fixture, engine) = ready_engine();
    let result = engine
        .retrieve("What happened in Vancouver in 2023", RetrieveOptions::default())
        .unwrap();

    assert_eq!(
        result.filter,
        Some(json!({"$and": [{"city": "Vancouver"}, {"year": "2023"}]}))
    );
    assert!(!result.blended);

    let mut records = hit_records(&result);
    records.sort();
    assert_eq!(records, vec!["1", "2"]);
    for hit in &result.hits {
        assert_eq!(hit.metadata.city, "Vancouver");
        assert_eq!(hit.metadata.year, "2023");
    }
}

#[test]
fn test_sparse_filter_blends_without_dropping_filtered_hits() {
    let (_fixture, engine) = ready_engine();
    let result = engine
        .retrieve("What happened in Brussels in 2023", RetrieveOptions::default())
        .unwrap();

    assert!(result.blended);
    let records = hit_records(&result);
    assert!(records.contains(&"4".to_string()));
    assert!(records.len() > 1);
    assert!(result.candidate_count <= 24);
}

#[test]
fn test_comparison_query_is_unfiltered() {
    let (_fixture, engine) = ready_engine();
    let result = engine
        .retrieve(
            "Compare major incidents in 2021 versus 2023",
            RetrieveOptions::default(),
        )
        .unwrap();

    assert_eq!(result.filter, None);
    assert_eq!(result.facts.years_mentioned, vec![2021, 2023]);
    assert_eq!(result.facts.year, None);
    assert!(!result.hits.is_empty());
}

#[test]
fn test_caller_filter_wins_over_parsed_filter() {
    let (_fixture, engine) = ready_engine();
    let opts = RetrieveOptions::default()
        .with_filter(MetadataFilter::equals(FilterField::Country, "Chile"));
    let result = engine.retrieve("valve leak in Vancouver 2023", opts).unwrap();

    assert_eq!(result.filter, Some(json!({"country": "Chile"})));
    assert_eq!(hit_records(&result), vec!["6"]);
    // Parsed facts are still reported.
    assert_eq!(result.facts.location.as_deref(), Some("Vancouver"));
}

#[test]
fn test_rejected_filter_falls_back_to_unfiltered() {
    let (_fixture, engine) = ready_engine();
    let opts = RetrieveOptions::default()
        .with_filter(MetadataFilter::equals(FilterField::IsMajor, "yes"));
    let result = engine.retrieve("electrical arc flash", opts).unwrap();

    assert!(!result.blended);
    assert!(!result.hits.is_empty());
    assert_eq!(hit_records(&result)[0], "6");
}

#[test]
fn test_high_risk_flag_filter() {
    let (_fixture, engine) = ready_engine();
    let result = engine
        .retrieve("high risk incidents", RetrieveOptions::default().with_results(10))
        .unwrap();

    let mut records = hit_records(&result);
    records.sort();
    assert_eq!(records, vec!["1", "5", "6", "7"]);
    assert!(result.hits.iter().all(|h| h.metadata.is_high_risk == 1));
}

#[test]
fn test_hits_are_one_per_record_and_truncated() {
    let (_fixture, engine) = ready_engine();
    let result = engine
        .retrieve(
            "why did the contractor crew skip the permit",
            RetrieveOptions::default().with_results(3),
        )
        .unwrap();

    assert_eq!(result.hits.len(), 3);
    let unique: HashSet<&str> = result.hits.iter().map(|h| h.report_id()).collect();
    assert_eq!(unique.len(), 3);
    assert!(result
        .hits
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));
}

#[test]
fn test_without_parse_embeds_raw_question() {
    let (_fixture, engine) = ready_engine();
    let question = "What happened in Vancouver in 2023";
    let result = engine
        .retrieve(question, RetrieveOptions::default().without_parse())
        .unwrap();

    assert_eq!(result.expanded_query, question);
    assert_eq!(result.filter, None);
    assert!(result.facts.is_empty());
    assert!(hit_records(&result).len() > 2);
}

#[test]
fn test_expansion_is_embedded() {
    let (_fixture, engine) = ready_engine();
    let result = engine
        .retrieve("chemical splash", RetrieveOptions::default())
        .unwrap();

    assert!(result
        .expanded_query
        .ends_with("chemical vapor release spill exposure toxic hazardous"));
    assert_eq!(hit_records(&result)[0], "5");
}

#[test]
fn test_context_blocks_cite_hits() {
    let (fixture, engine) = ready_engine();
    let result = engine
        .retrieve("arc flash in chile", RetrieveOptions::default())
        .unwrap();
    let context = format_context(&result.hits, fixture.config().context.max_body_chars);

    assert!(context.starts_with("SOURCE 1 [#6 | Major | Chile | 2023 | "));
    assert!(context.contains("Title: Electrical Arc During Maintenance"));
    assert!(!context.contains("[Record #"));
}

#[test]
fn test_retrieve_before_initialize_is_an_error() {
    let fixture = Fixture::new();
    fixture.write_dataset(&incidents_csv());
    let engine = fixture.engine();

    let err = engine
        .retrieve("anything", RetrieveOptions::default())
        .unwrap_err();
    assert!(matches!(err, IncidexError::NotInitialized));
}
