//! Terminal styling for user-facing messages.
//!
//! Built on the anstyle ecosystem:
//! - anstream for auto-detecting color support
//! - color-print (`cformat!`) for inline markup
//! - Semantic message helpers so every error, hint, and warning looks the same
//!
//! ## stdout vs stderr
//!
//! - **stdout**: primary data (`arbor list`, `arbor status`, `arbor resolve`)
//! - **stderr**: status messages (success, errors, hints, warnings)

mod constants;
mod format;
mod suggest;

pub use anstream::{eprint, eprintln, print, println};

pub use constants::*;
pub use format::{GUTTER_OVERHEAD, format_with_gutter};
pub use suggest::suggest_command;

/// Get terminal width, or `usize::MAX` if detection fails.
///
/// Checks stderr first (status messages go there), then stdout, then `COLUMNS`.
pub fn get_terminal_width() -> usize {
    if let Some((terminal_size::Width(w), _)) =
        terminal_size::terminal_size_of(std::io::stderr()).or_else(terminal_size::terminal_size)
    {
        return w as usize;
    }

    if let Ok(cols) = std::env::var("COLUMNS")
        && let Ok(width) = cols.parse::<usize>()
    {
        return width;
    }

    usize::MAX
}

/// Visual width of a string, ignoring ANSI escape codes.
pub fn visual_width(s: &str) -> usize {
    use ansi_str::AnsiStr;
    use unicode_width::UnicodeWidthStr;
    s.ansi_strip().width()
}
