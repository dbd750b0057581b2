//! Debug logging and crash dumps.
//!
//! Nothing here writes to stdout or stderr: the terminal belongs to the renderer.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

const DEFAULT_FILTER: &str = "tape_term=debug";

/// Installs a file-backed tracing subscriber when `TAPE_DEBUG_LOG` is set.
///
/// The returned guard must be kept alive for buffered records to be flushed. Returns `None` when
/// no debug log is configured, the directory cannot be created, or a global subscriber already
/// exists.
pub fn init(config: &EnvConfig) -> Option<WorkerGuard> {
    let path = config.debug_log.as_ref()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let file_name = path.file_name()?;
    fs::create_dir_all(&dir).ok()?;

    let filter = EnvFilter::try_from_env("TAPE_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .ok()?;

    Some(guard)
}

/// Frame state captured when a component renders a line wider than the terminal.
#[derive(Debug, Clone)]
pub struct CrashReport<'a> {
    pub reason: String,
    pub terminal_width: usize,
    pub terminal_height: usize,
    pub previous_lines: &'a [String],
    pub new_lines: &'a [String],
}

impl CrashReport<'_> {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "tape_term crash: {}", self.reason);
        let _ = writeln!(
            out,
            "terminal: {}x{}",
            self.terminal_width, self.terminal_height
        );
        dump_frame(&mut out, "previous frame", self.previous_lines);
        dump_frame(&mut out, "new frame", self.new_lines);
        out
    }
}

fn dump_frame(out: &mut String, title: &str, lines: &[String]) {
    let _ = writeln!(out, "\n=== {title} ({} lines) ===", lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let width = crate::core::text::width::visible_width(line);
        let _ = writeln!(out, "[{idx}] (w={width}) {line:?}");
    }
}

/// Writes the crash dump, creating parent directories as needed.
pub fn write_crash_log(path: &Path, report: &CrashReport<'_>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, report.to_text())
}

#[cfg(test)]
mod tests {
    use super::{init, write_crash_log, CrashReport};
    use crate::config::EnvConfig;

    #[test]
    fn crash_report_includes_both_frames_and_widths() {
        let previous = vec!["ok".to_string()];
        let new = vec!["ok".to_string(), "way too wide".to_string()];
        let report = CrashReport {
            reason: "line 1 overflow".to_string(),
            terminal_width: 4,
            terminal_height: 10,
            previous_lines: &previous,
            new_lines: &new,
        };

        let text = report.to_text();
        assert!(text.contains("terminal: 4x10"));
        assert!(text.contains("=== previous frame (1 lines) ==="));
        assert!(text.contains("=== new frame (2 lines) ==="));
        assert!(text.contains("[1] (w=12) \"way too wide\""));
    }

    #[test]
    fn write_crash_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("crash.log");
        let lines = vec!["x".to_string()];
        let report = CrashReport {
            reason: "test".to_string(),
            terminal_width: 1,
            terminal_height: 1,
            previous_lines: &[],
            new_lines: &lines,
        };

        write_crash_log(&path, &report).expect("write crash log");
        let written = std::fs::read_to_string(&path).expect("read back");
        assert!(written.starts_with("tape_term crash: test"));
    }

    #[test]
    fn init_without_debug_log_installs_nothing() {
        assert!(init(&EnvConfig::default()).is_none());
    }

    #[test]
    fn init_writes_records_to_the_debug_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("debug.log");
        let config = EnvConfig {
            debug_log: Some(path.clone()),
            ..EnvConfig::default()
        };

        let guard = init(&config).expect("subscriber installed");
        tracing::debug!(probe = "kitty", "probe resolved");
        drop(guard);

        let written = std::fs::read_to_string(&path).expect("read back");
        assert!(written.contains("probe resolved"));
    }
}
