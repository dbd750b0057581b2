//! Hardware cursor placement.
//!
//! A focused component either reports its cursor through `Component::cursor_pos` or embeds
//! [`CURSOR_MARKER`] in its output. The marker is an APC string, so terminals that see it by
//! accident ignore it and width measurement treats it as zero columns.

use crate::core::text::width::visible_width;

pub const CURSOR_MARKER: &str = "\x1b_tape:c\x07";

/// Position within a frame: `row` is a frame line index, `col` a visible column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPos {
    pub row: usize,
    pub col: usize,
}

/// Finds, strips and locates the marker, searching only the bottom `height` lines.
///
/// The search runs bottom-up and stops at the first marker, so only one is honoured per frame.
pub(crate) fn extract_cursor_marker(lines: &mut [String], height: usize) -> Option<CursorPos> {
    let viewport_top = lines.len().saturating_sub(height);
    for row in (viewport_top..lines.len()).rev() {
        let Some(index) = lines[row].find(CURSOR_MARKER) else {
            continue;
        };
        let col = visible_width(&lines[row][..index]);
        lines[row].replace_range(index..index + CURSOR_MARKER.len(), "");
        return Some(CursorPos { row, col });
    }
    None
}
