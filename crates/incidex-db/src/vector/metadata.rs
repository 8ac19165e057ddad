//! Chunk metadata schema and the metadata filter language.
//!
//! Every stored chunk carries a flat [`ChunkMetadata`] record. Filters only
//! ever target this closed set of fields, with equality predicates combined
//! by conjunction, so both backends can evaluate them: the simple backend
//! in-process via [`MetadataFilter::matches`], LanceDB via
//! [`MetadataFilter::to_lance_filter`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DbError, DbResult};

// ============================================================================
// ChunkMetadata
// ============================================================================

/// Flat metadata stored with each chunk.
///
/// A denormalized copy of the parent incident record's scalar fields. The
/// four flags are stored as 0/1 integers, everything else as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub report_id: String,
    pub title: String,
    pub severity: String,
    pub category: String,
    pub country: String,
    pub city: String,
    /// Display location ("City, Country", "Unknown Location", ...).
    pub location: String,
    /// Year as a string; filters compare it as a string.
    pub year: String,
    pub risk: String,
    pub section: String,
    pub is_major: i64,
    pub is_high_risk: i64,
    pub has_injury: i64,
    pub is_near_miss: i64,
    pub injury: String,
    pub classification: String,
}

impl ChunkMetadata {
    /// Read a single field as a filter value.
    pub fn value_of(&self, field: FilterField) -> FilterValue {
        let text = |s: &str| FilterValue::Str(s.to_string());
        match field {
            FilterField::ReportId => text(&self.report_id),
            FilterField::Title => text(&self.title),
            FilterField::Severity => text(&self.severity),
            FilterField::Category => text(&self.category),
            FilterField::Country => text(&self.country),
            FilterField::City => text(&self.city),
            FilterField::Location => text(&self.location),
            FilterField::Year => text(&self.year),
            FilterField::Risk => text(&self.risk),
            FilterField::Section => text(&self.section),
            FilterField::Injury => text(&self.injury),
            FilterField::Classification => text(&self.classification),
            FilterField::IsMajor => FilterValue::Int(self.is_major),
            FilterField::IsHighRisk => FilterValue::Int(self.is_high_risk),
            FilterField::HasInjury => FilterValue::Int(self.has_injury),
            FilterField::IsNearMiss => FilterValue::Int(self.is_near_miss),
        }
    }
}

// ============================================================================
// FilterField / FilterValue
// ============================================================================

/// The closed set of filterable metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
    ReportId,
    Title,
    Severity,
    Category,
    Country,
    City,
    Location,
    Year,
    Risk,
    Section,
    IsMajor,
    IsHighRisk,
    HasInjury,
    IsNearMiss,
    Injury,
    Classification,
}

impl FilterField {
    /// All fields, in storage column order.
    pub const ALL: [FilterField; 16] = [
        FilterField::ReportId,
        FilterField::Title,
        FilterField::Severity,
        FilterField::Category,
        FilterField::Country,
        FilterField::City,
        FilterField::Location,
        FilterField::Year,
        FilterField::Risk,
        FilterField::Section,
        FilterField::IsMajor,
        FilterField::IsHighRisk,
        FilterField::HasInjury,
        FilterField::IsNearMiss,
        FilterField::Injury,
        FilterField::Classification,
    ];

    /// Column / key name of this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::ReportId => "report_id",
            FilterField::Title => "title",
            FilterField::Severity => "severity",
            FilterField::Category => "category",
            FilterField::Country => "country",
            FilterField::City => "city",
            FilterField::Location => "location",
            FilterField::Year => "year",
            FilterField::Risk => "risk",
            FilterField::Section => "section",
            FilterField::IsMajor => "is_major",
            FilterField::IsHighRisk => "is_high_risk",
            FilterField::HasInjury => "has_injury",
            FilterField::IsNearMiss => "is_near_miss",
            FilterField::Injury => "injury",
            FilterField::Classification => "classification",
        }
    }

    /// Look up a field by its key name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    /// Whether the field stores a 0/1 integer flag.
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            FilterField::IsMajor
                | FilterField::IsHighRisk
                | FilterField::HasInjury
                | FilterField::IsNearMiss
        )
    }
}

impl std::fmt::Display for FilterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive filter operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Str(String),
    Int(i64),
}

impl FilterValue {
    fn to_json(&self) -> Value {
        match self {
            FilterValue::Str(s) => Value::String(s.clone()),
            FilterValue::Int(i) => Value::from(*i),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FilterValue::Str(_) => "string",
            FilterValue::Int(_) => "integer",
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Str(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Int(i)
    }
}

impl From<i32> for FilterValue {
    fn from(i: i32) -> Self {
        FilterValue::Int(i64::from(i))
    }
}

// ============================================================================
// MetadataFilter
// ============================================================================

/// Equality predicate or conjunction of predicates over [`ChunkMetadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    /// `field == value`
    Eq { field: FilterField, value: FilterValue },
    /// All nested filters must match.
    And(Vec<MetadataFilter>),
}

impl MetadataFilter {
    /// Equality predicate.
    pub fn equals(field: FilterField, value: impl Into<FilterValue>) -> Self {
        MetadataFilter::Eq {
            field,
            value: value.into(),
        }
    }

    /// Combine predicates: none → `None`, one → itself, more → `And`.
    pub fn all_of(mut filters: Vec<MetadataFilter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(MetadataFilter::And(filters)),
        }
    }

    /// Flattened list of equality predicates.
    pub fn predicates(&self) -> Vec<(FilterField, &FilterValue)> {
        match self {
            MetadataFilter::Eq { field, value } => vec![(*field, value)],
            MetadataFilter::And(inner) => inner.iter().flat_map(|f| f.predicates()).collect(),
        }
    }

    /// Check that the collection can evaluate this filter.
    ///
    /// Flag fields only compare against integers and text fields only
    /// against strings; an empty conjunction is also refused.
    pub fn validate(&self) -> DbResult<()> {
        match self {
            MetadataFilter::Eq { field, value } => {
                let ok = match value {
                    FilterValue::Int(_) => field.is_flag(),
                    FilterValue::Str(_) => !field.is_flag(),
                };
                if ok {
                    Ok(())
                } else {
                    Err(DbError::filter_rejected(format!(
                        "field '{}' cannot be compared with a {} value",
                        field,
                        value.kind()
                    )))
                }
            }
            MetadataFilter::And(inner) => {
                if inner.is_empty() {
                    return Err(DbError::filter_rejected("empty $and conjunction"));
                }
                inner.iter().try_for_each(|f| f.validate())
            }
        }
    }

    /// Evaluate the filter against one chunk's metadata.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match self {
            MetadataFilter::Eq { field, value } => &metadata.value_of(*field) == value,
            MetadataFilter::And(inner) => inner.iter().all(|f| f.matches(metadata)),
        }
    }

    /// Build a SQL-like WHERE clause for LanceDB.
    pub fn to_lance_filter(&self) -> String {
        match self {
            MetadataFilter::Eq { field, value } => match value {
                FilterValue::Str(s) => format!("{} = '{}'", field, escape_sql_string(s)),
                FilterValue::Int(i) => format!("{} = {}", field, i),
            },
            MetadataFilter::And(inner) => inner
                .iter()
                .map(|f| match f {
                    MetadataFilter::And(_) => format!("({})", f.to_lance_filter()),
                    MetadataFilter::Eq { .. } => f.to_lance_filter(),
                })
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    /// Render in document form: `{"city": "Vancouver"}` or `{"$and": [...]}`.
    pub fn to_json(&self) -> Value {
        match self {
            MetadataFilter::Eq { field, value } => {
                let mut map = Map::new();
                map.insert(field.as_str().to_string(), value.to_json());
                Value::Object(map)
            }
            MetadataFilter::And(inner) => {
                let mut map = Map::new();
                map.insert(
                    "$and".to_string(),
                    Value::Array(inner.iter().map(|f| f.to_json()).collect()),
                );
                Value::Object(map)
            }
        }
    }

    /// Parse the document form.
    ///
    /// Accepts `{"field": value}`, multi-key objects (implicit conjunction)
    /// and `{"$and": [ ... ]}`. Booleans are read as 0/1 flags.
    pub fn from_json(value: &Value) -> DbResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| DbError::invalid_filter("filter must be a JSON object"))?;

        let mut filters = Vec::with_capacity(object.len());
        for (key, operand) in object {
            if key == "$and" {
                let items = operand
                    .as_array()
                    .ok_or_else(|| DbError::invalid_filter("$and expects an array"))?;
                let nested = items
                    .iter()
                    .map(Self::from_json)
                    .collect::<DbResult<Vec<_>>>()?;
                filters.push(MetadataFilter::And(nested));
                continue;
            }

            let field = FilterField::from_name(key)
                .ok_or_else(|| DbError::invalid_filter(format!("unknown field '{}'", key)))?;
            let value = match operand {
                Value::String(s) => FilterValue::Str(s.clone()),
                Value::Bool(b) => FilterValue::Int(i64::from(*b)),
                Value::Number(n) => n.as_i64().map(FilterValue::Int).ok_or_else(|| {
                    DbError::invalid_filter(format!("field '{}' expects an integer", key))
                })?,
                _ => {
                    return Err(DbError::invalid_filter(format!(
                        "field '{}' expects a string or integer, operators are not supported",
                        key
                    )))
                }
            };
            filters.push(MetadataFilter::Eq { field, value });
        }

        Self::all_of(filters).ok_or_else(|| DbError::invalid_filter("filter is empty"))
    }
}

impl std::fmt::Display for MetadataFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Escape single quotes in SQL strings.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vancouver_chunk() -> ChunkMetadata {
        ChunkMetadata {
            report_id: "42".to_string(),
            city: "Vancouver".to_string(),
            country: "Canada".to_string(),
            year: "2023".to_string(),
            severity: "Major".to_string(),
            is_major: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in FilterField::ALL {
            assert_eq!(FilterField::from_name(field.as_str()), Some(field));
        }
        assert_eq!(FilterField::from_name("base"), None);
    }

    #[test]
    fn test_all_of_shapes() {
        assert_eq!(MetadataFilter::all_of(vec![]), None);

        let single = MetadataFilter::all_of(vec![MetadataFilter::equals(FilterField::City, "X")]);
        assert!(matches!(single, Some(MetadataFilter::Eq { .. })));

        let both = MetadataFilter::all_of(vec![
            MetadataFilter::equals(FilterField::City, "X"),
            MetadataFilter::equals(FilterField::Year, "2020"),
        ]);
        assert!(matches!(both, Some(MetadataFilter::And(ref v)) if v.len() == 2));
    }

    #[test]
    fn test_matches() {
        let meta = vancouver_chunk();
        assert!(MetadataFilter::equals(FilterField::City, "Vancouver").matches(&meta));
        assert!(!MetadataFilter::equals(FilterField::City, "Brussels").matches(&meta));
        assert!(MetadataFilter::equals(FilterField::IsMajor, 1).matches(&meta));

        let conj = MetadataFilter::And(vec![
            MetadataFilter::equals(FilterField::City, "Vancouver"),
            MetadataFilter::equals(FilterField::Year, "2023"),
        ]);
        assert!(conj.matches(&meta));

        let miss = MetadataFilter::And(vec![
            MetadataFilter::equals(FilterField::City, "Vancouver"),
            MetadataFilter::equals(FilterField::Year, "2021"),
        ]);
        assert!(!miss.matches(&meta));
    }

    #[test]
    fn test_year_compares_as_string() {
        let meta = vancouver_chunk();
        let as_int = MetadataFilter::equals(FilterField::Year, 2023);
        assert!(!as_int.matches(&meta));
        assert!(matches!(
            as_int.validate(),
            Err(DbError::FilterRejected { .. })
        ));
    }

    #[test]
    fn test_validate() {
        assert!(MetadataFilter::equals(FilterField::IsHighRisk, 1).validate().is_ok());
        assert!(MetadataFilter::equals(FilterField::IsHighRisk, "1").validate().is_err());
        assert!(MetadataFilter::And(vec![]).validate().is_err());
    }

    #[test]
    fn test_to_lance_filter() {
        let filter = MetadataFilter::And(vec![
            MetadataFilter::equals(FilterField::City, "Vancouver"),
            MetadataFilter::equals(FilterField::IsHighRisk, 1),
        ]);
        assert_eq!(
            filter.to_lance_filter(),
            "city = 'Vancouver' AND is_high_risk = 1"
        );

        let quoted = MetadataFilter::equals(FilterField::Title, "Operator's error");
        assert_eq!(quoted.to_lance_filter(), "title = 'Operator''s error'");
    }

    #[test]
    fn test_from_json_single() {
        let filter = MetadataFilter::from_json(&json!({"city": "Vancouver"})).unwrap();
        assert_eq!(filter, MetadataFilter::equals(FilterField::City, "Vancouver"));
    }

    #[test]
    fn test_from_json_and() {
        let doc = json!({"$and": [{"city": "Vancouver"}, {"year": "2023"}]});
        let filter = MetadataFilter::from_json(&doc).unwrap();
        assert_eq!(filter.predicates().len(), 2);
        assert_eq!(filter.to_json(), doc);
    }

    #[test]
    fn test_from_json_bool_flag() {
        let filter = MetadataFilter::from_json(&json!({"is_high_risk": true})).unwrap();
        assert_eq!(filter, MetadataFilter::equals(FilterField::IsHighRisk, 1));
    }

    #[test]
    fn test_from_json_rejects_unknown_and_operators() {
        assert!(MetadataFilter::from_json(&json!({"branch": "main"})).is_err());
        assert!(MetadataFilter::from_json(&json!({"year": {"$gt": 2020}})).is_err());
        assert!(MetadataFilter::from_json(&json!({})).is_err());
        assert!(MetadataFilter::from_json(&json!(["city"])).is_err());
    }

    #[test]
    fn test_escape_sql_string() {
        assert_eq!(escape_sql_string("hello"), "hello");
        assert_eq!(escape_sql_string("it's"), "it''s");
    }
}
