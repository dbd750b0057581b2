//! Terminal I/O adapter for Unix processes.

pub mod pipeline;
pub mod process_terminal;
pub mod restore;
pub mod stdin_buffer;
pub mod writer;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use pipeline::{InputPipeline, PipelineOutput};
pub use process_terminal::ProcessTerminal;
#[cfg(unix)]
pub use restore::install_signal_handlers;
pub use restore::{emergency_restore, install_panic_hook, PanicHookGuard, SignalHookGuard};
pub use stdin_buffer::{StdinBuffer, StdinEvent};
pub use writer::TerminalWriter;

/// A panicked handler must not wedge the input thread or the crash path.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
