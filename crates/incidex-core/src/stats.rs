//! Index status reporting.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use incidex_db::vector::CollectionMeta;

use crate::dataset::IncidentRecord;

/// Readiness of the retrieval index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// No index build has succeeded in this process.
    NotInitialized,
    /// An index exists but holds no chunks.
    NotReady,
    Ready,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::NotInitialized => "not_initialized",
            IndexStatus::NotReady => "not_ready",
            IndexStatus::Ready => "ready",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the active index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub status: IndexStatus,
    pub chunks: usize,
    pub records: usize,
    /// Distinct record years, ascending.
    pub years: Vec<i64>,
    /// Record count per display severity.
    pub severity_dist: BTreeMap<String, usize>,
    pub rebuilding: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

impl IndexStats {
    pub fn not_initialized(rebuilding: bool) -> Self {
        Self {
            status: IndexStatus::NotInitialized,
            chunks: 0,
            records: 0,
            years: Vec::new(),
            severity_dist: BTreeMap::new(),
            rebuilding,
            collection: None,
            embedding_model: None,
            built_at: None,
        }
    }

    /// Stats for an active generation holding `chunks` chunks.
    pub fn from_records(
        records: &[IncidentRecord],
        chunks: usize,
        meta: &CollectionMeta,
        rebuilding: bool,
    ) -> Self {
        let mut years: Vec<i64> = records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();

        let mut severity_dist = BTreeMap::new();
        for record in records {
            *severity_dist.entry(record.severity.clone()).or_insert(0) += 1;
        }

        Self {
            status: if chunks == 0 {
                IndexStatus::NotReady
            } else {
                IndexStatus::Ready
            },
            chunks,
            records: records.len(),
            years,
            severity_dist,
            rebuilding,
            collection: Some(meta.physical_name()),
            embedding_model: Some(meta.embedding_model.clone()),
            built_at: meta.created_at.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == IndexStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incidex_db::vector::CollectionConfig;

    fn record(year: i64, severity: &str) -> IncidentRecord {
        IncidentRecord {
            report_id: format!("{}-{}", year, severity),
            title: String::new(),
            severity: severity.to_string(),
            category: String::new(),
            risk_tier: "Unknown".to_string(),
            is_high_risk: false,
            city: String::new(),
            country: "Unknown".to_string(),
            location_label: "Unknown".to_string(),
            year,
            classification: String::new(),
            injury_label: "Unknown".to_string(),
            has_injury: true,
            is_major: false,
            is_near_miss: false,
            what_happened: String::new(),
            what_could_have_happened: String::new(),
            why_did_it_happen: String::new(),
            causal_factors: String::new(),
            what_went_well: String::new(),
            lessons_to_prevent: String::new(),
            actions: String::new(),
        }
    }

    #[test]
    fn test_from_records() {
        let meta = CollectionMeta::new("safety_incidents", 3, "simple", "m", &CollectionConfig::new(8));
        let records = vec![record(2023, "Major"), record(2021, "Minor"), record(2023, "Minor")];
        let stats = IndexStats::from_records(&records, 7, &meta, false);
        assert_eq!(stats.status, IndexStatus::Ready);
        assert_eq!(stats.years, vec![2021, 2023]);
        assert_eq!(stats.severity_dist.get("Minor"), Some(&2));
        assert_eq!(stats.collection.as_deref(), Some("safety_incidents-g3"));
    }

    #[test]
    fn test_zero_chunks_is_not_ready() {
        let meta = CollectionMeta::new("safety_incidents", 1, "simple", "m", &CollectionConfig::new(8));
        let stats = IndexStats::from_records(&[], 0, &meta, false);
        assert_eq!(stats.status, IndexStatus::NotReady);
        assert!(!stats.is_ready());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["status"], "not_ready");
    }

    #[test]
    fn test_not_initialized() {
        let stats = IndexStats::not_initialized(true);
        assert_eq!(stats.status.to_string(), "not_initialized");
        assert!(stats.rebuilding);
    }
}
