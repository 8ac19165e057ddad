//! Chunk building.
//!
//! Each incident contributes up to four chunks, one per substantive narrative
//! section. Every chunk starts with a bracketed header so it stays
//! self-describing when read out of context.

use tracing::info;

use incidex_db::vector::ChunkMetadata;

use crate::dataset::IncidentRecord;

/// Indexed sections as `(label, source column)`, in emission order.
pub const SECTIONS: [(&str, &str); 4] = [
    ("What Happened", "what_happened"),
    ("Root Cause", "why_did_it_happen"),
    ("Causal Factors", "causal_factors"),
    ("Lessons & Prevention", "lessons_to_prevent"),
];

/// Section label matched by factual questions.
pub const SECTION_WHAT_HAPPENED: &str = "What Happened";

/// Section label matched by prevention questions.
pub const SECTION_LESSONS: &str = "Lessons & Prevention";

/// One indexable narrative excerpt.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `rec<report_id>_<column>`, stable across rebuilds.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn section(&self) -> &str {
        &self.metadata.section
    }

    pub fn report_id(&self) -> &str {
        &self.metadata.report_id
    }
}

/// Deterministic chunk id.
pub fn chunk_id(report_id: &str, column: &str) -> String {
    format!("rec{}_{}", report_id, column)
}

/// Header line shared by all chunks of a record.
pub fn chunk_header(record: &IncidentRecord, location: &str) -> String {
    format!(
        "[Record #{} | {} | {} | {} | {} | Risk:{}]",
        record.report_id, record.severity, record.category, location, record.year, record.risk_tier
    )
}

/// Build the chunks for a single record.
///
/// Sections whose trimmed text is shorter than `min_chars` characters are
/// skipped, so a record yields between zero and four chunks.
pub fn record_chunks(record: &IncidentRecord, min_chars: usize) -> Vec<Chunk> {
    let location = record.display_location();
    let header = chunk_header(record, &location);

    SECTIONS
        .iter()
        .filter_map(|(label, column)| {
            let body = record.text_field(column)?.trim();
            if body.chars().count() < min_chars {
                return None;
            }

            let text = format!(
                "{}\nTitle: {}\nLocation: {}\nSection: {}\n\n{}",
                header, record.title, location, label, body
            );

            Some(Chunk {
                id: chunk_id(&record.report_id, column),
                text,
                metadata: chunk_metadata(record, &location, label),
            })
        })
        .collect()
}

/// Build chunks for every record, in record then section order.
pub fn build_chunks(records: &[IncidentRecord], min_chars: usize) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = records
        .iter()
        .flat_map(|record| record_chunks(record, min_chars))
        .collect();
    info!("Built {} chunks from {} records", chunks.len(), records.len());
    chunks
}

/// Digest identifying a chunk set independent of its order.
///
/// Covers ids, texts and metadata, so any edit that changes what would be
/// indexed changes the fingerprint.
pub fn chunks_fingerprint(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = blake3::Hasher::new();
    for chunk in ordered {
        hasher.update(chunk.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(chunk.text.as_bytes());
        hasher.update(&[0]);
        // Field order is fixed by the struct, so the JSON form is stable.
        if let Ok(metadata) = serde_json::to_vec(&chunk.metadata) {
            hasher.update(&metadata);
        }
        hasher.update(&[0xff]);
    }
    hasher.finalize().to_hex().to_string()
}

fn chunk_metadata(record: &IncidentRecord, location: &str, section: &str) -> ChunkMetadata {
    ChunkMetadata {
        report_id: record.report_id.clone(),
        title: record.title.clone(),
        severity: record.severity.clone(),
        category: record.category.clone(),
        country: record.country.clone(),
        city: record.city.clone(),
        location: location.to_string(),
        year: record.year.to_string(),
        risk: record.risk_tier.clone(),
        section: section.to_string(),
        is_major: i64::from(record.is_major),
        is_high_risk: i64::from(record.is_high_risk),
        has_injury: i64::from(record.has_injury),
        is_near_miss: i64::from(record.is_near_miss),
        injury: record.injury_label.clone(),
        classification: record.classification.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> IncidentRecord {
        IncidentRecord {
            report_id: "42".to_string(),
            title: "Ladder Slip".to_string(),
            severity: "Serious".to_string(),
            category: "Safety".to_string(),
            risk_tier: "Medium".to_string(),
            is_high_risk: false,
            city: "Brussels".to_string(),
            country: "Belgium".to_string(),
            location_label: "Brussels".to_string(),
            year: 2022,
            classification: "Unsafe Act".to_string(),
            injury_label: "First Aid".to_string(),
            has_injury: true,
            is_major: false,
            is_near_miss: false,
            what_happened: "  Technician slipped from the third rung of a ladder.  ".to_string(),
            what_could_have_happened: String::new(),
            why_did_it_happen: "Wet rungs.".to_string(),
            causal_factors: "x".repeat(20),
            what_went_well: String::new(),
            lessons_to_prevent: "y".repeat(19),
            actions: String::new(),
        }
    }

    #[test]
    fn test_chunk_text_layout() {
        let chunks = record_chunks(&record(), 20);
        let first = &chunks[0];
        assert_eq!(first.id, "rec42_what_happened");
        assert_eq!(
            first.text,
            "[Record #42 | Serious | Safety | Brussels, Belgium | 2022 | Risk:Medium]\n\
             Title: Ladder Slip\n\
             Location: Brussels, Belgium\n\
             Section: What Happened\n\n\
             Technician slipped from the third rung of a ladder."
        );
        assert_eq!(first.metadata.location, "Brussels, Belgium");
        assert_eq!(first.metadata.city, "Brussels");
        assert_eq!(first.metadata.year, "2022");
        assert_eq!(first.metadata.has_injury, 1);
        assert_eq!(first.metadata.is_major, 0);
    }

    #[test]
    fn test_min_length_boundary() {
        let chunks = record_chunks(&record(), 20);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        // causal_factors is exactly 20 chars, lessons_to_prevent 19, root cause 10
        assert_eq!(ids, vec!["rec42_what_happened", "rec42_causal_factors"]);
    }

    #[test]
    fn test_header_mirrors_record_fields() {
        let r = record();
        for chunk in record_chunks(&r, 20) {
            let header = chunk.text.lines().next().unwrap();
            assert!(header.contains(&format!("#{}", r.report_id)));
            assert!(header.contains(&r.severity));
            assert!(header.contains(&r.category));
            assert!(header.contains(&chunk.metadata.location));
            assert!(header.contains(&chunk.metadata.year));
            assert!(header.ends_with(&format!("Risk:{}]", chunk.metadata.risk)));
            assert_eq!(chunk.report_id(), r.report_id);
        }
    }

    #[test]
    fn test_empty_record_yields_no_chunks() {
        let mut r = record();
        r.what_happened = "   ".to_string();
        r.causal_factors = String::new();
        assert!(record_chunks(&r, 20).is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content_not_order() {
        let records = vec![record(), IncidentRecord { report_id: "43".into(), ..record() }];
        let chunks = build_chunks(&records, 20);
        let base = chunks_fingerprint(&chunks);
        assert_eq!(base.len(), 64);

        let mut reversed = chunks.clone();
        reversed.reverse();
        assert_eq!(chunks_fingerprint(&reversed), base);

        let mut edited = records.clone();
        edited[0].what_happened = "Painter fell when a scaffold plank collapsed.".to_string();
        assert_ne!(chunks_fingerprint(&build_chunks(&edited, 20)), base);

        let mut relabelled = records;
        relabelled[1].injury_label = "Lost Time".to_string();
        assert_ne!(chunks_fingerprint(&build_chunks(&relabelled, 20)), base);
    }

    #[test]
    fn test_build_chunks_is_deterministic() {
        let records = vec![record(), IncidentRecord { report_id: "43".into(), ..record() }];
        let a = build_chunks(&records, 20);
        let b = build_chunks(&records, 20);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        assert_eq!(a[2].section(), SECTION_WHAT_HAPPENED);
    }
}
