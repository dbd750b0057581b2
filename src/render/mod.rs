//! Frame emission and overlay compositing.

pub mod overlay;
pub mod renderer;

pub use overlay::{
    composite_line_at, composite_overlays, resolve_overlay_layout, resolve_overlay_position,
    resolve_overlay_size, OverlayAnchor, OverlayLayout, OverlayMargin, OverlayOptions,
    OverlaySize, ParseSizeError, RenderedOverlay, SizeValue,
};
pub use renderer::{DiffRenderer, RenderOptions, RenderOutput, Strategy};
