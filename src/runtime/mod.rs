//! Runtime orchestration: focus, overlays and the render loop.

pub mod focus;
pub mod overlay;
pub mod tui;

pub use focus::FocusState;
pub use overlay::{OverlayEntry, OverlayHandle, OverlayStack};
pub use tui::{RenderHandle, TuiRuntime};
