//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |

use owo_colors::OwoColorize;

use super::color::ColorMode;

/// Message type for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }
}

/// Styling interface for CLI output.
///
/// # Example
///
/// ```
/// use incidex_cli::ui::{ColorMode, MessageType, Style};
///
/// let style = Style::new(ColorMode::Never);
/// assert_eq!(style.message(MessageType::Ok, "Indexed"), "[ok] Indexed");
/// ```
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    /// A message with a type prefix.
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let prefix = msg_type.prefix();
        if self.colors_enabled() {
            let colored_prefix = match msg_type {
                MessageType::Ok => prefix.green().to_string(),
                MessageType::Err => prefix.red().to_string(),
                MessageType::Warn => prefix.yellow().to_string(),
                MessageType::Info => prefix.blue().to_string(),
                MessageType::Hint => prefix.cyan().to_string(),
            };
            format!("{} {}", colored_prefix, text)
        } else {
            format!("{} {}", prefix, text)
        }
    }

    /// An error with optional cause and hint lines.
    ///
    /// ```text
    /// [err] Index not initialized.
    ///       Cause: ...
    ///       Hint: Run `incidex index` first
    /// ```
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause_text) = cause {
            output.push_str(&format!("\n      Cause: {}", cause_text));
        }
        if let Some(hint_text) = hint {
            output.push_str(&format!("\n      Hint: {}", hint_text));
        }
        output
    }

    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    /// Rerank score, colored by magnitude: >= 0.6 green, >= 0.4 yellow, else red.
    pub fn score(&self, value: f64) -> String {
        let formatted = format!("{:.4}", value);
        if !self.colors_enabled() {
            return formatted;
        }
        if value >= 0.6 {
            formatted.green().to_string()
        } else if value >= 0.4 {
            formatted.yellow().to_string()
        } else {
            formatted.red().to_string()
        }
    }

    /// Severity label; `Major` and `Serious` stand out.
    pub fn severity(&self, label: &str) -> String {
        if !self.colors_enabled() {
            return label.to_string();
        }
        match label {
            "Major" => label.red().bold().to_string(),
            "Serious" | "Potentially Significant" => label.yellow().to_string(),
            "Near Miss" => label.cyan().to_string(),
            _ => label.to_string(),
        }
    }

    /// `#<report_id>`, colored yellow.
    pub fn record_id(&self, id: &str) -> String {
        let tagged = format!("#{}", id);
        if self.colors_enabled() {
            tagged.yellow().to_string()
        } else {
            tagged
        }
    }

    /// Index status word: `ready` green, anything else yellow.
    pub fn status(&self, status: &str) -> String {
        if !self.colors_enabled() {
            return status.to_string();
        }
        if status == "ready" {
            status.green().to_string()
        } else {
            status.yellow().to_string()
        }
    }
}
