//! Overlay layout and ANSI-safe line splicing.
//!
//! Layout happens in two passes because an overlay's height is only known after it renders:
//! [`resolve_overlay_size`] fixes the width and height cap from the terminal size alone, the
//! runtime renders the component at that width and clamps its lines, then
//! [`resolve_overlay_position`] places the clamped block.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::image::is_image_line;
use crate::core::output::SEGMENT_RESET;
use crate::core::text::slice::{extract_segments, slice_by_column, slice_with_width, SliceResult};
use crate::core::text::width::visible_width;

const DEFAULT_OVERLAY_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlayAnchor {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    TopCenter,
    BottomCenter,
    LeftCenter,
    RightCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Start,
    Middle,
    End,
}

impl OverlayAnchor {
    fn vertical(self) -> Band {
        match self {
            Self::TopLeft | Self::TopCenter | Self::TopRight => Band::Start,
            Self::LeftCenter | Self::Center | Self::RightCenter => Band::Middle,
            Self::BottomLeft | Self::BottomCenter | Self::BottomRight => Band::End,
        }
    }

    fn horizontal(self) -> Band {
        match self {
            Self::TopLeft | Self::LeftCenter | Self::BottomLeft => Band::Start,
            Self::TopCenter | Self::Center | Self::BottomCenter => Band::Middle,
            Self::TopRight | Self::RightCenter | Self::BottomRight => Band::End,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayMargin {
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
    pub left: usize,
}

impl OverlayMargin {
    pub fn uniform(value: usize) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

/// An absolute cell count or a percentage of a reference extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeValue {
    Absolute(usize),
    Percent(f32),
}

impl SizeValue {
    fn resolve(self, reference: usize) -> usize {
        match self {
            Self::Absolute(value) => value,
            Self::Percent(percent) => percent_of(reference, percent),
        }
    }
}

fn percent_of(reference: usize, percent: f32) -> usize {
    ((reference as f32) * (percent.max(0.0) / 100.0)).floor() as usize
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid overlay size {0:?}, expected a cell count like \"40\" or a percentage like \"40%\"")]
pub struct ParseSizeError(String);

impl FromStr for SizeValue {
    type Err = ParseSizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || ParseSizeError(value.to_string());
        match trimmed.strip_suffix('%') {
            Some(number) => {
                let percent: f32 = number.trim().parse().map_err(|_| invalid())?;
                if !percent.is_finite() || percent < 0.0 {
                    return Err(invalid());
                }
                Ok(Self::Percent(percent))
            }
            None => trimmed.parse().map(Self::Absolute).map_err(|_| invalid()),
        }
    }
}

pub type VisibilityFn = Box<dyn Fn(usize, usize) -> bool>;

/// Placement options for an overlay. Every field is optional; the default is a centered
/// overlay up to 80 columns wide.
#[derive(Default)]
pub struct OverlayOptions {
    pub width: Option<SizeValue>,
    pub min_width: Option<usize>,
    pub max_height: Option<SizeValue>,
    pub anchor: Option<OverlayAnchor>,
    pub offset_x: Option<i32>,
    pub offset_y: Option<i32>,
    /// Absolute row, or a percentage of the free vertical space. Overrides the anchor's row.
    pub row: Option<SizeValue>,
    /// Absolute column, or a percentage of the free horizontal space. Overrides the anchor's column.
    pub col: Option<SizeValue>,
    pub margin: Option<OverlayMargin>,
    /// Called with the terminal width and height; a hidden overlay is neither drawn nor focused.
    pub visible: Option<VisibilityFn>,
}

impl OverlayOptions {
    pub fn is_visible(&self, term_width: usize, term_height: usize) -> bool {
        self.visible
            .as_ref()
            .map_or(true, |visible| visible(term_width, term_height))
    }
}

impl fmt::Debug for OverlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayOptions")
            .field("width", &self.width)
            .field("min_width", &self.min_width)
            .field("max_height", &self.max_height)
            .field("anchor", &self.anchor)
            .field("offset_x", &self.offset_x)
            .field("offset_y", &self.offset_y)
            .field("row", &self.row)
            .field("col", &self.col)
            .field("margin", &self.margin)
            .field("visible", &self.visible.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlaySize {
    pub width: usize,
    pub max_height: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayLayout {
    pub width: usize,
    pub row: usize,
    pub col: usize,
    pub max_height: Option<usize>,
}

/// An overlay's lines ready to splice, positioned in screen coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOverlay {
    pub lines: Vec<String>,
    pub row: usize,
    pub col: usize,
    pub width: usize,
}

struct Available {
    width: usize,
    height: usize,
}

fn available(margin: &OverlayMargin, term_width: usize, term_height: usize) -> Available {
    Available {
        width: term_width.saturating_sub(margin.left + margin.right).max(1),
        height: term_height.saturating_sub(margin.top + margin.bottom).max(1),
    }
}

/// Width and height cap, independent of the overlay's content.
pub fn resolve_overlay_size(
    options: &OverlayOptions,
    term_width: usize,
    term_height: usize,
) -> OverlaySize {
    let margin = options.margin.unwrap_or_default();
    let avail = available(&margin, term_width, term_height);

    let mut width = options
        .width
        .map_or(DEFAULT_OVERLAY_WIDTH.min(avail.width), |size| size.resolve(term_width));
    if let Some(min_width) = options.min_width {
        width = width.max(min_width);
    }
    let max_height = options
        .max_height
        .map(|size| size.resolve(term_height).clamp(1, avail.height));

    OverlaySize {
        width: width.clamp(1, avail.width),
        max_height,
    }
}

/// Top-left screen cell for an overlay whose rendered (and clamped) height is known.
pub fn resolve_overlay_position(
    options: &OverlayOptions,
    width: usize,
    height: usize,
    term_width: usize,
    term_height: usize,
) -> (usize, usize) {
    let margin = options.margin.unwrap_or_default();
    let avail = available(&margin, term_width, term_height);
    let anchor = options.anchor.unwrap_or_default();

    let free_rows = avail.height.saturating_sub(height);
    let free_cols = avail.width.saturating_sub(width);

    let row = match options.row {
        Some(SizeValue::Absolute(row)) => row,
        Some(SizeValue::Percent(percent)) => margin.top + percent_of(free_rows, percent),
        None => margin.top + band_offset(anchor.vertical(), free_rows),
    };
    let col = match options.col {
        Some(SizeValue::Absolute(col)) => col,
        Some(SizeValue::Percent(percent)) => margin.left + percent_of(free_cols, percent),
        None => margin.left + band_offset(anchor.horizontal(), free_cols),
    };

    let row = apply_offset(row, options.offset_y.unwrap_or(0));
    let col = apply_offset(col, options.offset_x.unwrap_or(0));

    let max_row = term_height.saturating_sub(margin.bottom + height);
    let max_col = term_width.saturating_sub(margin.right + width);
    (
        row.min(max_row).max(margin.top),
        col.min(max_col).max(margin.left),
    )
}

/// Both layout passes at once, for callers that already know the content height.
pub fn resolve_overlay_layout(
    options: &OverlayOptions,
    overlay_height: usize,
    term_width: usize,
    term_height: usize,
) -> OverlayLayout {
    let size = resolve_overlay_size(options, term_width, term_height);
    let height = size
        .max_height
        .map_or(overlay_height, |max| overlay_height.min(max));
    let (row, col) = resolve_overlay_position(options, size.width, height, term_width, term_height);
    OverlayLayout {
        width: size.width,
        row,
        col,
        max_height: size.max_height,
    }
}

fn band_offset(band: Band, free: usize) -> usize {
    match band {
        Band::Start => 0,
        Band::Middle => free / 2,
        Band::End => free,
    }
}

fn apply_offset(value: usize, offset: i32) -> usize {
    if offset >= 0 {
        value.saturating_add(offset as usize)
    } else {
        value.saturating_sub(offset.unsigned_abs() as usize)
    }
}

/// Splices overlays into the base frame, bottom-most first.
///
/// Overlay rows are screen rows: they land in the last `term_height` lines of the working
/// frame, which is padded with blank lines so it covers both the overlays and every row the
/// renderer has previously occupied.
pub fn composite_overlays(
    lines: Vec<String>,
    overlays: &[RenderedOverlay],
    term_width: usize,
    term_height: usize,
    max_lines_rendered: usize,
) -> Vec<String> {
    if overlays.is_empty() {
        return lines;
    }

    let mut result = lines;
    let needed = overlays
        .iter()
        .map(|overlay| overlay.row + overlay.lines.len())
        .fold(result.len(), usize::max);
    let working_height = max_lines_rendered.max(needed);
    result.resize(working_height, String::new());

    let viewport_start = working_height.saturating_sub(term_height);
    for overlay in overlays {
        for (offset, line) in overlay.lines.iter().enumerate() {
            let Some(base) = result.get_mut(viewport_start + overlay.row + offset) else {
                continue;
            };
            *base = composite_line_at(base, line, overlay.col, overlay.width, term_width);
        }
    }
    result
}

/// Replaces columns `[start_col, start_col + overlay_width)` of `base_line` with `overlay_line`.
///
/// The result is padded to exactly `total_width` columns where the base is shorter, and never
/// exceeds it. Image lines are returned untouched.
pub fn composite_line_at(
    base_line: &str,
    overlay_line: &str,
    start_col: usize,
    overlay_width: usize,
    total_width: usize,
) -> String {
    if is_image_line(base_line) {
        return base_line.to_string();
    }

    let after_start = start_col.saturating_add(overlay_width);
    let base = extract_segments(
        base_line,
        start_col,
        after_start,
        total_width.saturating_sub(after_start),
        true,
    );
    // A wide glyph straddling the left seam is dropped so the overlay keeps its column.
    let before = if base.before_width > start_col {
        slice_with_width(base_line, 0, start_col, true)
    } else {
        SliceResult {
            text: base.before,
            width: base.before_width,
        }
    };
    let overlay = slice_with_width(overlay_line, 0, overlay_width, true);
    let after_target = total_width.saturating_sub(start_col + overlay_width);

    let mut out = String::with_capacity(base_line.len() + overlay_line.len() + 32);
    out.push_str(&before.text);
    pad(&mut out, start_col.saturating_sub(before.width));
    out.push_str(SEGMENT_RESET);
    out.push_str(&overlay.text);
    pad(&mut out, overlay_width.saturating_sub(overlay.width));
    out.push_str(SEGMENT_RESET);
    out.push_str(&base.after);
    pad(&mut out, after_target.saturating_sub(base.after_width));

    if visible_width(&out) <= total_width {
        out
    } else {
        slice_by_column(&out, 0, total_width, true)
    }
}

fn pad(out: &mut String, columns: usize) {
    out.extend(std::iter::repeat(' ').take(columns));
}
