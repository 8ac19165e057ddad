//! # CLI UI Module
//!
//! Styling and formatting layer for `incidex` output. Everything here degrades
//! to plain text when colors are off (`--color never`, `NO_COLOR`, or a
//! non-TTY stdout), and is bypassed entirely by `--json`.
//!
//! - `color`: color mode and terminal capability checks
//! - `style`: message prefixes and value styling
//! - `format`: text truncation, counts and timestamps
//! - `table`: comfy-table renderers for sources and distributions
//! - `progress`: spinner for index builds

pub mod color;
pub mod format;
pub mod progress;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use progress::{Progress, ProgressMode};
pub use style::{MessageType, Style};
