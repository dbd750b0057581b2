//! Inline differential terminal rendering with asynchronous capability negotiation.
//!
//! Invariant: single output gate. The runtime writes to the terminal only through
//! `core::output::OutputGate::flush(..)`; the input thread's protocol replies go through the
//! same `TerminalWriter`.
//!
//! # Layers
//! - [`platform`]: raw-mode process terminal, stdin reassembly, emergency restore.
//! - [`negotiate`]: terminal identity plus Kitty keyboard, sixel, cell size and appearance
//!   probes answered over the keystroke stream.
//! - [`render`]: strategy-selecting differential renderer and overlay compositor.
//! - [`runtime`]: [`TUI`] with render coalescing, focus and overlays.

#![allow(clippy::type_complexity, clippy::unnecessary_map_or)]

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod negotiate;
pub mod platform;
pub mod render;
pub mod runtime;

pub use crate::config::EnvConfig;
pub use crate::error::{RenderError, TuiError};

/// Component model.
pub use crate::core::component::{component_rc, Component, ComponentRc, Focusable};
pub use crate::core::container::Container;
pub use crate::core::cursor::{CursorPos, CURSOR_MARKER};

/// Key event classification.
pub use crate::core::input::{is_key_release, is_key_repeat, key_event_type, KeyEventType};

/// Terminal interfaces and the process-backed implementation.
pub use crate::core::output::{OutputGate, TerminalCmd};
pub use crate::core::terminal::{Terminal, TerminalGuard};
pub use crate::platform::{emergency_restore, ProcessTerminal};

/// Image helpers.
pub use crate::core::image::{
    calculate_image_rows, delete_all_kitty_images, delete_kitty_image, encode_iterm2,
    encode_kitty, is_image_line, CellDimensions, ImageDimensions, ImageProtocol,
};

/// Capability negotiation.
pub use crate::negotiate::{
    Appearance, CapabilityEvent, NegotiatedCapabilities, NotificationProtocol, TerminalIdentity,
    TerminalInfo,
};

/// Rendering and overlays.
pub use crate::render::{
    DiffRenderer, OverlayAnchor, OverlayMargin, OverlayOptions, RenderOptions, RenderOutput,
    SizeValue, Strategy,
};
pub use crate::runtime::{OverlayHandle, RenderHandle};

/// Alias for the main runtime type.
pub type TUI<T> = crate::runtime::tui::TuiRuntime<T>;

/// Visible width helper that ignores ANSI control sequences.
pub use crate::core::text::width::visible_width;
/// Column slicing that keeps escape sequences intact.
pub use crate::core::text::slice::slice_by_column;
