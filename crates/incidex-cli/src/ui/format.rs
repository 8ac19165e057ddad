//! Formatting utilities for CLI output.

use chrono::{DateTime, Utc};

/// Truncate to at most `max_len` characters, ending in `...` when cut.
///
/// ```
/// use incidex_cli::ui::format::truncate_str;
///
/// assert_eq!(truncate_str("valve leak", 20), "valve leak");
/// assert_eq!(truncate_str("valve leak at pump station", 10), "valve l...");
/// ```
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}

/// Collapse all whitespace runs (including newlines) into single spaces.
pub fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Relative age of an RFC 3339 timestamp ("just now", "5 mins ago", "3h ago",
/// "2d ago"), or the date for anything older than a week. Unparseable input
/// is returned as-is.
pub fn format_relative_time(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => relative_to(parsed.with_timezone(&Utc), Utc::now()),
        Err(_) => timestamp.to_string(),
    }
}

fn relative_to(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(timestamp);

    if duration.num_seconds() < 0 {
        timestamp.format("%Y-%m-%d").to_string()
    } else if duration.num_minutes() < 1 {
        "just now".to_string()
    } else if duration.num_hours() < 1 {
        format!("{} mins ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Number with thousands separators.
pub fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let len = digits.len();
    let mut result = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
