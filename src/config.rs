//! Environment configuration.

use std::env;
use std::path::PathBuf;

/// Default location of the crash log, relative to the home directory.
const DEFAULT_CRASH_LOG: &str = ".tape/crash.log";

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub hardware_cursor: bool,
    pub clear_on_shrink: bool,
    pub write_log: Option<PathBuf>,
    pub debug_log: Option<PathBuf>,
    pub debug_redraw: bool,
    pub crash_log: Option<PathBuf>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            hardware_cursor: env_flag("TAPE_HARDWARE_CURSOR"),
            clear_on_shrink: env_flag("TAPE_CLEAR_ON_SHRINK"),
            write_log: env_string_opt("TAPE_WRITE_LOG").map(PathBuf::from),
            debug_log: env_string_opt("TAPE_DEBUG_LOG").map(PathBuf::from),
            debug_redraw: env_flag("TAPE_DEBUG_REDRAW"),
            crash_log: env_string_opt("TAPE_CRASH_LOG").map(PathBuf::from),
        }
    }

    /// Where the renderer dumps frame state on a width overflow.
    ///
    /// Falls back to `~/.tape/crash.log`; `None` only when no home directory is known.
    pub fn crash_log_path(&self) -> Option<PathBuf> {
        self.crash_log
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_CRASH_LOG)))
    }
}

pub(crate) fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

pub(crate) fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
