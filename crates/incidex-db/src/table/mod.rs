//! Raw CSV dataset tables.
//!
//! Reads a headered CSV file into a [`RawTable`] of optional strings using
//! the Arrow CSV reader. Every column is read as text; typing and cleaning
//! are left to the caller. Empty cells come back as `None`.

use crate::error::{DbError, DbResult};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow_array::{Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Rows per Arrow record batch while reading.
const READ_BATCH_SIZE: usize = 1024;

/// A CSV file loaded as text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Build a table from headers and rows (used by tests and in-memory callers).
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    /// Read a headered CSV file.
    pub fn read_csv(path: &Path) -> DbResult<Self> {
        debug!("Reading CSV table {:?}", path);

        let mut file = File::open(path).map_err(|e| DbError::csv(path, e.to_string()))?;

        // Only the header names matter; every column is read as text.
        let format = Format::default().with_header(true);
        let (inferred, _) = format
            .infer_schema(&mut file, Some(1))
            .map_err(|e| DbError::csv(path, e.to_string()))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| DbError::csv(path, e.to_string()))?;

        let headers: Vec<String> = inferred
            .fields()
            .iter()
            .map(|f| f.name().trim().to_string())
            .collect();
        if headers.is_empty() {
            return Err(DbError::csv(path, "file has no header row"));
        }

        let schema = Schema::new(
            inferred
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        );

        let reader = ReaderBuilder::new(Arc::new(schema))
            .with_header(true)
            .with_truncated_rows(true)
            .with_batch_size(READ_BATCH_SIZE)
            .build(file)
            .map_err(|e| DbError::csv(path, e.to_string()))?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| DbError::csv(path, e.to_string()))?;
            append_batch(&batch, &mut rows)?;
        }

        debug!("Read {} rows x {} columns", rows.len(), headers.len());
        Ok(Self { headers, rows })
    }

    /// Column names, in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Names from `required` that the table lacks.
    pub fn missing_columns<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|c| !self.has_column(c))
            .collect()
    }

    /// Cell value by row and column name; `None` for empty or absent cells.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }
}

fn append_batch(batch: &RecordBatch, rows: &mut Vec<Vec<Option<String>>>) -> DbResult<()> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| {
            c.as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| DbError::internal("CSV column was not read as text"))
        })
        .collect::<DbResult<Vec<_>>>()?;

    for row in 0..batch.num_rows() {
        let cells = columns
            .iter()
            .map(|col| {
                if col.is_null(row) {
                    return None;
                }
                let value = col.value(row);
                if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(temp: &TempDir, content: &str) -> std::path::PathBuf {
        let path = temp.path().join("incidents.csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_csv_basic() {
        let temp = TempDir::new().unwrap();
        let path = write_csv(
            &temp,
            "report_id,title,year\n1,Slip on ice,2023\n2,,2021\n",
        );

        let table = RawTable::read_csv(&path).unwrap();
        assert_eq!(table.headers(), &["report_id", "title", "year"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "title"), Some("Slip on ice"));
        assert_eq!(table.get(1, "title"), None);
        assert_eq!(table.get(1, "year"), Some("2021"));
        assert_eq!(table.get(0, "missing"), None);
        assert_eq!(table.get(5, "title"), None);
    }

    #[test]
    fn test_numeric_looking_columns_stay_text() {
        let temp = TempDir::new().unwrap();
        let path = write_csv(&temp, "report_id,risk\n12.0,1.0\n13,\n");

        let table = RawTable::read_csv(&path).unwrap();
        assert_eq!(table.get(0, "report_id"), Some("12.0"));
        assert_eq!(table.get(0, "risk"), Some("1.0"));
        assert_eq!(table.get(1, "risk"), None);
    }

    #[test]
    fn test_quoted_multiline_fields() {
        let temp = TempDir::new().unwrap();
        let path = write_csv(
            &temp,
            "report_id,what_happened\n7,\"Worker slipped,\nthen fell \"\"hard\"\"\"\n",
        );

        let table = RawTable::read_csv(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(0, "what_happened"),
            Some("Worker slipped,\nthen fell \"hard\"")
        );
    }

    #[test]
    fn test_missing_columns() {
        let table = RawTable::new(vec!["report_id".into(), "title".into()], vec![]);
        assert!(table.is_empty());
        assert_eq!(
            table.missing_columns(&["report_id", "severity", "title", "year"]),
            vec!["severity", "year"]
        );
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = RawTable::read_csv(&temp.path().join("nope.csv"));
        assert!(matches!(result, Err(DbError::Csv { .. })));
    }
}
