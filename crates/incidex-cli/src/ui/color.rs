//! Color mode detection for CLI output.
//!
//! Respects the `NO_COLOR` environment variable (https://no-color.org/) and
//! TTY detection.

use std::io::IsTerminal;

use clap::ValueEnum;

/// Color output mode, selected with `--color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Always use colors, even when output is not a TTY.
    Always,
    /// Never use colors.
    Never,
    /// Colors when stdout is a terminal and `NO_COLOR` is unset.
    #[default]
    Auto,
}

impl ColorMode {
    /// Check if colors should be used.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }
}

/// Current terminal width, or 100 when it cannot be determined.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(100)
}
