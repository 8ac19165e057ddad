//! Dataset loading and normalization.
//!
//! Reads the incident CSV into a [`RawTable`], checks the required columns
//! and turns every row into an [`IncidentRecord`] with canonical display
//! values and derived flags. Normalization never fails on a malformed row:
//! bad years fall back to the dataset median and bad risk codes to "Unknown".

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use incidex_db::table::RawTable;
use incidex_db::DbError;

use crate::errors::{IncidexError, IncidexResult};

/// Columns every dataset must carry.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "report_id",
    "title",
    "severity",
    "what_happened",
    "why_did_it_happen",
];

/// Narrative columns, defaulted to the empty string when absent.
pub const TEXT_COLUMNS: [&str; 7] = [
    "what_happened",
    "what_could_have_happened",
    "why_did_it_happen",
    "causal_factors",
    "what_went_well",
    "lessons_to_prevent",
    "actions",
];

/// Raw injury text longer than this is free-form prose, not a label.
const INJURY_LABEL_MAX_CHARS: usize = 60;

const UNKNOWN: &str = "Unknown";

// ============================================================================
// IncidentRecord
// ============================================================================

/// One normalized incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub report_id: String,
    pub title: String,
    /// Major, Serious, Potentially Significant, Near Miss, Minor or Unknown.
    pub severity: String,
    pub category: String,
    /// High, Medium, Low or Unknown.
    pub risk_tier: String,
    /// Risk code 1.
    pub is_high_risk: bool,
    pub city: String,
    pub country: String,
    /// City if present, else country.
    pub location_label: String,
    pub year: i64,
    pub classification: String,
    pub injury_label: String,
    pub has_injury: bool,
    pub is_major: bool,
    pub is_near_miss: bool,

    pub what_happened: String,
    pub what_could_have_happened: String,
    pub why_did_it_happen: String,
    pub causal_factors: String,
    pub what_went_well: String,
    pub lessons_to_prevent: String,
    pub actions: String,
}

impl IncidentRecord {
    /// Narrative text for a source column, `None` for non-narrative names.
    pub fn text_field(&self, column: &str) -> Option<&str> {
        let text = match column {
            "what_happened" => &self.what_happened,
            "what_could_have_happened" => &self.what_could_have_happened,
            "why_did_it_happen" => &self.why_did_it_happen,
            "causal_factors" => &self.causal_factors,
            "what_went_well" => &self.what_went_well,
            "lessons_to_prevent" => &self.lessons_to_prevent,
            "actions" => &self.actions,
            _ => return None,
        };
        Some(text.as_str())
    }

    /// Location shown in chunk headers.
    ///
    /// `City, Country` when both are known, the city alone when the country
    /// is unknown, the country when there is no city, else `Unknown Location`.
    pub fn display_location(&self) -> String {
        let city = self.city.trim();
        let country = self.country.trim();
        let has_city = !city.is_empty() && city != UNKNOWN && city != "Nan";
        let has_country = !country.is_empty() && country != UNKNOWN;

        match (has_city, has_country) {
            (true, true) => format!("{}, {}", city, country),
            (true, false) => city.to_string(),
            (false, true) => country.to_string(),
            (false, false) => "Unknown Location".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Read the dataset CSV without normalizing it.
pub fn load_dataset(path: &Path) -> IncidexResult<RawTable> {
    if !path.exists() {
        return Err(IncidexError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }

    RawTable::read_csv(path).map_err(|e| match e {
        DbError::Io(io) => IncidexError::Io(io),
        other => IncidexError::DatasetRead {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

/// Reject tables missing any of [`REQUIRED_COLUMNS`].
pub fn validate_columns(table: &RawTable) -> IncidexResult<()> {
    let missing = table.missing_columns(&REQUIRED_COLUMNS);
    if missing.is_empty() {
        return Ok(());
    }
    Err(IncidexError::DatasetMissingColumns {
        missing: missing.into_iter().map(String::from).collect(),
        found: table.headers().to_vec(),
    })
}

/// Load, validate and normalize the dataset in one step.
pub fn load_records(path: &Path) -> IncidexResult<Vec<IncidentRecord>> {
    let table = load_dataset(path)?;
    validate_columns(&table)?;
    let records = normalize_table(&table);
    info!(
        "Loaded and cleaned {} records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalize every row of a table. Rows without a `report_id` are skipped.
pub fn normalize_table(table: &RawTable) -> Vec<IncidentRecord> {
    let years: Vec<Option<i64>> = (0..table.len())
        .map(|row| table.get(row, "year").and_then(parse_year))
        .collect();
    let fallback_year = median_year(&years);

    let mut records = Vec::with_capacity(table.len());
    for (row, year) in years.into_iter().enumerate() {
        let field = |name: &str| table.get(row, name);

        let Some(report_id) = field("report_id").map(normalize_id).filter(|id| !id.is_empty())
        else {
            warn!("Skipping row {} without report_id", row + 1);
            continue;
        };

        let raw_severity = field("severity").unwrap_or("").trim().to_lowercase();
        let risk_code = field("risk").and_then(parse_risk_code);
        let city = title_case(field("city").unwrap_or("").trim());
        let country = infer_country(field("country"), &city);
        let location_label = if city.is_empty() {
            country.clone()
        } else {
            city.clone()
        };
        let injury_label = injury_label(field("injury_category"));
        let text = |name: &str| field(name).unwrap_or("").to_string();

        records.push(IncidentRecord {
            report_id,
            title: display_or_unknown(field("title")),
            severity: display_or_unknown(field("severity")),
            category: display_or_unknown(field("category")),
            risk_tier: risk_tier(risk_code).to_string(),
            is_high_risk: risk_code == Some(1),
            city,
            country,
            location_label,
            year: year.or(fallback_year).unwrap_or_default(),
            classification: title_case(field("primary_classification").unwrap_or("")),
            has_injury: injury_label != "Injury",
            injury_label,
            is_major: raw_severity == "major",
            is_near_miss: raw_severity == "near miss",
            what_happened: text("what_happened"),
            what_could_have_happened: text("what_could_have_happened"),
            why_did_it_happen: text("why_did_it_happen"),
            causal_factors: text("causal_factors"),
            what_went_well: text("what_went_well"),
            lessons_to_prevent: text("lessons_to_prevent"),
            actions: text("actions"),
        });
    }

    debug!(
        "Normalized {} of {} rows (median year {:?})",
        records.len(),
        table.len(),
        fallback_year
    );
    records
}

/// Upper-case the first letter of each alphabetic run, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Map a risk code to its tier label.
pub fn risk_tier(code: Option<i64>) -> &'static str {
    match code {
        Some(1) => "High",
        Some(2) => "Medium",
        Some(3) => "Low",
        _ => UNKNOWN,
    }
}

fn parse_risk_code(raw: &str) -> Option<i64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.fract() == 0.0 && value.is_finite()).then_some(value as i64)
}

fn parse_year(raw: &str) -> Option<i64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value.trunc() as i64)
}

/// Median of the valid years, truncated to an integer.
fn median_year(years: &[Option<i64>]) -> Option<i64> {
    let mut valid: Vec<i64> = years.iter().flatten().copied().collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_unstable();
    let mid = valid.len() / 2;
    if valid.len() % 2 == 1 {
        Some(valid[mid])
    } else {
        Some(((valid[mid - 1] + valid[mid]) as f64 / 2.0).trunc() as i64)
    }
}

/// `"123.0"` → `"123"`; ids read back from spreadsheets often gain a fraction.
fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(int) if !int.is_empty() && int.chars().all(|c| c.is_ascii_digit()) => int.to_string(),
        _ => trimmed.to_string(),
    }
}

fn display_or_unknown(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => title_case(value),
        None => UNKNOWN.to_string(),
    }
}

/// Heuristic fallback, not a gazetteer: only the two Canadian site names are recognized.
fn infer_country(raw: Option<&str>, city: &str) -> String {
    if let Some(country) = raw.map(str::trim).filter(|s| !s.is_empty()) {
        return title_case(country);
    }
    let city = city.to_lowercase();
    if city.contains("vancouver") || city.contains("working home") {
        "Canada".to_string()
    } else {
        UNKNOWN.to_string()
    }
}

fn injury_label(raw: Option<&str>) -> String {
    match raw.filter(|s| !s.trim().is_empty()) {
        Some(text) if text.chars().count() > INJURY_LABEL_MAX_CHARS => {
            "Medical Treatment".to_string()
        }
        Some(text) => title_case(text.trim()),
        None => UNKNOWN.to_string(),
    }
}
