//! Error types for rendering and runtime lifecycle.

use std::path::PathBuf;

use thiserror::Error;

/// Raised by the renderer before any byte of the offending frame is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("rendered line {row} is {line_width} columns wide but the terminal has {terminal_width}")]
    WidthOverflow {
        row: usize,
        line_width: usize,
        terminal_width: usize,
    },
}

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("terminal I/O error while {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "component rendered line {row} at {line_width} columns, terminal width is {terminal_width}{}",
        crash_log_suffix(.crash_log)
    )]
    WidthOverflow {
        row: usize,
        line_width: usize,
        terminal_width: usize,
        crash_log: Option<PathBuf>,
    },

    #[error("runtime is not started")]
    NotStarted,
}

impl TuiError {
    pub(crate) fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }
}

fn crash_log_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" (frame dump written to {})", path.display()),
        None => String::new(),
    }
}
