//! ANSI styling for terminal summaries.

use std::io::IsTerminal;

/// Text style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Errors.
    Red,
    /// Running state.
    Green,
    /// Stopped state and warnings.
    Yellow,
    /// Informational accents.
    Blue,
    /// State values.
    Cyan,
    /// Summaries and unset values.
    Dim,
    /// Key names.
    Bold,
}

impl Style {
    /// SGR parameter of the style.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Red => "31",
            Self::Green => "32",
            Self::Yellow => "33",
            Self::Blue => "34",
            Self::Cyan => "36",
            Self::Dim => "2",
            Self::Bold => "1",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Wraps `text` in the escape sequence of `style`.
#[must_use]
pub fn paint(style: Style, text: &str) -> String {
    format!("\x1b[{}m{text}{RESET}", style.code())
}

/// Paints only when `enabled`.
#[must_use]
pub fn paint_if(enabled: bool, style: Style, text: &str) -> String {
    if enabled {
        paint(style, text)
    } else {
        text.to_string()
    }
}

/// Returns true if stdout is a terminal and `NO_COLOR` is unset.
#[must_use]
pub fn colors_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}
