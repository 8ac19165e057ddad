//! Spinner for long-running operations, built on `indicatif`.
//!
//! Hidden when stdout is not a TTY and for `--json` output.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// How progress feedback is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Animated spinner on a terminal.
    Interactive,
    /// Non-TTY: no spinner, final messages only.
    Quiet,
    /// Machine-readable output: nothing at all.
    Silent,
}

impl ProgressMode {
    pub fn detect(json: bool) -> Self {
        if json {
            Self::Silent
        } else if atty::is(atty::Stream::Stdout) {
            Self::Interactive
        } else {
            Self::Quiet
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

/// Braille spinner frames.
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// An indeterminate spinner.
pub struct Progress {
    bar: ProgressBar,
    mode: ProgressMode,
}

impl Progress {
    pub fn spinner(message: &str, mode: ProgressMode) -> Self {
        let bar = if mode.is_interactive() {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .tick_chars(SPINNER_CHARS)
                .template("{spinner:.cyan} {msg} ({elapsed})")
            {
                pb.set_style(style);
            }
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        } else {
            ProgressBar::hidden()
        };

        Self { bar, mode }
    }

    /// Clear the spinner and print `message` (unless silent or empty).
    pub fn finish_with_message(&self, message: &str) {
        self.bar.finish_and_clear();
        if self.mode != ProgressMode::Silent && !message.is_empty() {
            println!("{}", message);
        }
    }

    pub fn finish_clear(&self) {
        self.bar.finish_and_clear();
    }

    pub fn elapsed(&self) -> Duration {
        self.bar.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_is_silent() {
        assert_eq!(ProgressMode::detect(true), ProgressMode::Silent);
        assert!(!ProgressMode::Silent.is_interactive());
    }

    #[test]
    fn test_hidden_spinner_finishes() {
        let progress = Progress::spinner("Indexing", ProgressMode::Silent);
        progress.finish_clear();
        assert!(progress.elapsed() < Duration::from_secs(60));
    }
}
