//! Terminal trait and lifecycle helpers.

use crate::negotiate::{CapabilityEvent, NegotiatedCapabilities};

pub type InputHandler = Box<dyn FnMut(String) + Send>;
pub type ResizeHandler = Box<dyn FnMut() + Send>;
pub type CapabilityListener = Box<dyn FnMut(CapabilityEvent) + Send>;

/// Minimal terminal interface for the runtime.
pub trait Terminal {
    /// Start the terminal with input and resize handlers.
    fn start(&mut self, on_input: InputHandler, on_resize: ResizeHandler) -> std::io::Result<()>;

    /// Stop the terminal and restore state.
    fn stop(&mut self) -> std::io::Result<()>;

    /// Drain stdin before exiting to prevent key release leakage over slow connections.
    fn drain_input(&mut self, max_ms: u64, idle_ms: u64);

    /// Write output to the terminal. Never fails; a broken terminal swallows writes.
    fn write(&mut self, data: &str);

    /// Terminal dimensions.
    fn columns(&self) -> u16;
    fn rows(&self) -> u16;

    /// Receives negotiated capability changes. Must be set before `start` to see early replies.
    fn set_capability_listener(&mut self, _listener: CapabilityListener) {}

    /// Whether enhanced keyboard flags are currently pushed.
    fn kitty_protocol_active(&self) -> bool {
        false
    }

    /// What probing has established so far.
    fn negotiated(&self) -> NegotiatedCapabilities {
        NegotiatedCapabilities::default()
    }

    /// True once a write has failed; all later writes are dropped.
    fn is_dead(&self) -> bool {
        false
    }
}

/// RAII guard that drains input and stops the terminal on drop.
pub struct TerminalGuard<T: Terminal> {
    terminal: T,
    max_drain_ms: u64,
    idle_drain_ms: u64,
    armed: bool,
}

impl<T: Terminal> TerminalGuard<T> {
    /// Create a guard with default drain timings (max 1000ms, idle 50ms).
    pub fn new(terminal: T) -> Self {
        Self {
            terminal,
            max_drain_ms: 1000,
            idle_drain_ms: 50,
            armed: true,
        }
    }

    pub fn set_drain_timings(&mut self, max_ms: u64, idle_ms: u64) {
        self.max_drain_ms = max_ms;
        self.idle_drain_ms = idle_ms;
    }

    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    /// Skip cleanup on drop.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T: Terminal> Drop for TerminalGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            self.terminal
                .drain_input(self.max_drain_ms, self.idle_drain_ms);
            let _ = self.terminal.stop();
        }
    }
}
