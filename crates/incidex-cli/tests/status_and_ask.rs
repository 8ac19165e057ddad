//! `incidex status`, `incidex ask` and `incidex index` failure paths that do
//! not need an embedding model on disk.

mod common;

use predicates::prelude::*;

use common::Workspace;

#[test]
fn test_status_before_index_is_not_initialized() {
    let ws = Workspace::new();
    let stats = ws.json_ok(&["status", "--json"]);
    assert_eq!(stats["status"], "not_initialized");
    assert_eq!(stats["chunks"], 0);
    assert_eq!(stats["records"], 0);
    assert_eq!(stats["rebuilding"], false);
    assert!(stats.get("collection").is_none());
}

#[test]
fn test_status_hints_at_index_command() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: not_initialized"))
        .stdout(predicate::str::contains("Run `incidex index`"));
}

#[test]
fn test_ask_before_index_fails() {
    let ws = Workspace::new();
    let error = ws.json_error(&["ask", "What happened in Vancouver in 2023?", "--json"]);
    assert_eq!(error["code"], "not_initialized");

    ws.cmd()
        .args(["ask", "What happened in Vancouver in 2023?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Run `incidex index` first"));
}

#[test]
fn test_ask_rejects_malformed_filter_json() {
    let ws = Workspace::new();
    let error = ws.json_error(&["ask", "leaks", "--filter", "{city: Vancouver}", "--json"]);
    assert_eq!(error["code"], "invalid_filter");
    assert!(error["message"].as_str().unwrap().contains("not valid JSON"));
}

#[test]
fn test_ask_rejects_unknown_filter_field() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["ask", "leaks", "--filter", r#"{"shoe_size": "42"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown field 'shoe_size'"))
        .stderr(predicate::str::contains("Hint: Filters look like"));
}

#[test]
fn test_ask_rejects_zero_results() {
    let ws = Workspace::new();
    ws.cmd().args(["ask", "leaks", "-n", "0"]).assert().failure();
}

#[test]
fn test_index_without_dataset_fails() {
    let ws = Workspace::new();
    let error = ws.json_error(&["index", "--json"]);
    assert_eq!(error["code"], "dataset_not_found");
    assert!(!ws.index_path().join("safety_incidents.meta.json").exists());
}

#[test]
fn test_index_with_incomplete_dataset_keeps_configured_file() {
    let ws = Workspace::new();
    let original = "report_id,title,severity,what_happened,why_did_it_happen\n";
    ws.write_file("data/incidents.csv", original);
    let bad = ws.write_file("upload.csv", "report_id,title\n1,valve leak\n");

    ws.cmd()
        .args(["index", "--dataset"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required columns"))
        .stderr(predicate::str::contains(
            "Required columns: report_id, title, severity, what_happened, why_did_it_happen",
        ));

    assert_eq!(std::fs::read_to_string(ws.dataset_path()).unwrap(), original);
}

/// Record an index generation built by some other embedding model.
fn write_foreign_index_meta(ws: &Workspace) {
    let meta = serde_json::json!({
        "collection": "safety_incidents",
        "generation": 1,
        "backend": "simple",
        "embeddingModel": "other/model",
        "dimension": 32,
        "metric": "cosine",
        "chunkCount": 27,
        "recordCount": 8
    });
    ws.write_file(
        "index/safety_incidents.meta.json",
        &serde_json::to_string_pretty(&meta).unwrap(),
    );
}

#[test]
fn test_index_of_another_model_is_reported() {
    let ws = Workspace::new();
    write_foreign_index_meta(&ws);

    let error = ws.json_error(&["ask", "valve leak", "--json"]);
    assert_eq!(error["code"], "index_incompatible");
    assert!(error["message"].as_str().unwrap().contains("other/model"));

    let error = ws.json_error(&["status", "--json"]);
    assert_eq!(error["code"], "index_incompatible");

    ws.cmd()
        .args(["ask", "valve leak"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Run `incidex index` to rebuild"));
}
