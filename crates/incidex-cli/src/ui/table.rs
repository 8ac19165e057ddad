//! Table rendering with comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `incidex ask` | `render_sources_table()` |
//! | `incidex status` | `render_severity_table()` |

use std::collections::BTreeMap;

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use incidex_core::SourceSummary;

use super::format::truncate_str;

/// Ranked sources for `incidex ask`.
///
/// The TITLE column absorbs whatever `width` leaves after the fixed columns.
///
/// ```text
/// #   RECORD   SEVERITY   LOCATION    YEAR   SECTION         SCORE    TITLE
/// 1   6        Major      Chile       2023   What happened   0.8123   Electrical Arc During Maintenance
/// ```
pub fn render_sources_table(sources: &[SourceSummary], width: usize) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("#").set_alignment(CellAlignment::Right),
        Cell::new("RECORD"),
        Cell::new("SEVERITY"),
        Cell::new("LOCATION"),
        Cell::new("YEAR"),
        Cell::new("SECTION"),
        Cell::new("SCORE").set_alignment(CellAlignment::Right),
        Cell::new("TITLE"),
    ]);

    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(2)),  // #
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),  // RECORD
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // SEVERITY
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // LOCATION
        ColumnConstraint::LowerBoundary(Width::Fixed(4)),  // YEAR
        ColumnConstraint::LowerBoundary(Width::Fixed(7)),  // SECTION
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),  // SCORE
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // TITLE
    ]);

    let title_width = width.saturating_sub(90).max(20);

    for (i, source) in sources.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&source.record_id, 10)),
            Cell::new(truncate_str(&source.severity, 24)),
            Cell::new(truncate_str(&source.location, 16)),
            Cell::new(&source.year),
            Cell::new(&source.section),
            Cell::new(format!("{:.4}", source.score)).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&source.title, title_width)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Record count per severity with a share column, for `incidex status`.
///
/// ```text
/// SEVERITY                  RECORDS   SHARE
/// Major                           2     25%
/// Minor                           2     25%
/// ```
pub fn render_severity_table(distribution: &BTreeMap<String, usize>) -> String {
    if distribution.is_empty() {
        return String::new();
    }
    let total: usize = distribution.values().sum();

    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("SEVERITY"),
        Cell::new("RECORDS").set_alignment(CellAlignment::Right),
        Cell::new("SHARE").set_alignment(CellAlignment::Right),
    ]);

    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(24)), // SEVERITY
        ColumnConstraint::LowerBoundary(Width::Fixed(7)),  // RECORDS
        ColumnConstraint::LowerBoundary(Width::Fixed(5)),  // SHARE
    ]);

    // Largest share first; ties keep label order.
    let mut rows: Vec<(&String, &usize)> = distribution.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1));

    for (severity, count) in rows {
        let percent = if total > 0 {
            (*count as f64 / total as f64 * 100.0).round() as u64
        } else {
            0
        };
        table.add_row(vec![
            Cell::new(severity),
            Cell::new(count).set_alignment(CellAlignment::Right),
            Cell::new(format!("{}%", percent)).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}
