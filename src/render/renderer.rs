//! Inline differential renderer.
//!
//! The renderer owns the terminal rows below the point where the first frame was drawn. Rows
//! are tracked as frame-line indices and every cursor movement is relative, because the
//! absolute screen row of the owned region is never known in inline mode.
//!
//! Bookkeeping:
//! - `max_lines_rendered` is the high-water mark of rows the renderer has occupied.
//! - `viewport_top` is the frame line shown on the top screen row once content has scrolled
//!   (`max_lines_rendered - height`, or 0).
//! - `hardware_cursor_row` is the frame line the terminal cursor is on.

use std::fmt::Write as _;
use std::ops::Range;

use tracing::debug;

use crate::core::cursor::{extract_cursor_marker, CursorPos};
use crate::core::image::is_image_line;
use crate::core::output::{
    CLEAR_ALL, ERASE_DOWN, ERASE_LINE, HIDE_CURSOR, SEGMENT_RESET, SHOW_CURSOR, SYNC_BEGIN,
    SYNC_END,
};
use crate::core::text::width::visible_width;
use crate::error::RenderError;

/// How a frame was committed to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Rewrite every line from the top of the owned region, optionally clearing scrollback.
    HardReset { clear: bool },
    /// Return to the top of the visible owned rows, erase downward, write the visible slice.
    ViewportRepaint,
    /// Write only lines added after the previous end.
    AppendScroll,
    /// Rewrite the changed span in place.
    IncrementalDiff,
    /// Content unchanged; at most a cursor update.
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub width: usize,
    pub height: usize,
    pub clear_on_shrink: bool,
    pub has_overlays: bool,
    pub show_hardware_cursor: bool,
    /// Out-of-band cursor position. Takes precedence over an embedded cursor marker.
    pub cursor: Option<CursorPos>,
}

impl RenderOptions {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            clear_on_shrink: false,
            has_overlays: false,
            show_hardware_cursor: false,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub bytes: String,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Hidden,
    Placed {
        row: usize,
        col: usize,
        visible: bool,
    },
}

/// Previous frame. Lines, width and height are only ever replaced or dropped together.
#[derive(Debug, Clone)]
struct CommittedFrame {
    lines: Vec<String>,
    width: usize,
    height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    HardReset { clear: bool },
    ViewportRepaint { start: usize },
    AppendScroll { from: usize },
    IncrementalDiff { first: usize, last: usize },
    NoOp,
}

impl Plan {
    fn strategy(self) -> Strategy {
        match self {
            Self::HardReset { clear } => Strategy::HardReset { clear },
            Self::ViewportRepaint { .. } => Strategy::ViewportRepaint,
            Self::AppendScroll { .. } => Strategy::AppendScroll,
            Self::IncrementalDiff { .. } => Strategy::IncrementalDiff,
            Self::NoOp => Strategy::NoOp,
        }
    }

    /// Frame lines this plan writes.
    fn write_range(self, len: usize) -> Range<usize> {
        match self {
            Self::HardReset { .. } => 0..len,
            Self::ViewportRepaint { start } => start..len,
            Self::AppendScroll { from } => from..len,
            Self::IncrementalDiff { first, last } if first < len => first..last.min(len - 1) + 1,
            Self::IncrementalDiff { .. } | Self::NoOp => 0..0,
        }
    }
}

#[derive(Debug, Default)]
pub struct DiffRenderer {
    committed: Option<CommittedFrame>,
    viewport_top: usize,
    max_lines_rendered: usize,
    hardware_cursor_row: usize,
    last_cursor: Option<CursorState>,
    clear_requested: bool,
    debug_redraw: bool,
}

impl DiffRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs every strategy decision at debug level.
    pub fn set_debug_redraw(&mut self, enabled: bool) {
        self.debug_redraw = enabled;
    }

    pub fn hardware_cursor_row(&self) -> usize {
        self.hardware_cursor_row
    }

    pub fn viewport_top(&self) -> usize {
        self.viewport_top
    }

    pub fn max_lines_rendered(&self) -> usize {
        self.max_lines_rendered
    }

    /// Lines of the last committed frame, with the cursor marker already stripped.
    pub fn committed_lines(&self) -> &[String] {
        self.committed
            .as_ref()
            .map(|frame| frame.lines.as_slice())
            .unwrap_or(&[])
    }

    /// Forgets the committed frame so the next render clears and rewrites everything.
    pub fn request_full_redraw(&mut self) {
        self.committed = None;
        self.last_cursor = None;
        self.clear_requested = true;
    }

    /// Drops all state, e.g. before the runtime starts again.
    pub fn reset(&mut self) {
        *self = Self {
            debug_redraw: self.debug_redraw,
            ..Self::default()
        };
    }

    /// Moves the cursor to the start of the row after the content.
    pub fn cursor_below_content(&mut self) -> String {
        let len = self.committed_lines().len();
        if len == 0 {
            return String::new();
        }
        let mut out = String::new();
        move_rows(&mut out, self.hardware_cursor_row, len - 1);
        out.push_str("\r\n");
        self.hardware_cursor_row = len;
        out
    }

    pub fn render(
        &mut self,
        mut lines: Vec<String>,
        opts: &RenderOptions,
    ) -> Result<RenderOutput, RenderError> {
        let width = opts.width;
        let height = opts.height.max(1);

        let marker = extract_cursor_marker(&mut lines, height);
        let cursor = opts.cursor.or(marker);

        let (plan, reason) = self.plan(&lines, opts, height);
        check_widths(&lines, plan.write_range(lines.len()), width)?;

        if self.debug_redraw {
            debug!(
                strategy = ?plan.strategy(),
                reason,
                previous_lines = self.committed_lines().len(),
                new_lines = lines.len(),
                height,
                "redraw"
            );
        }

        let len = lines.len();
        let mut out = String::new();

        if plan == Plan::NoOp {
            let desired = self.desired_cursor(cursor, len, width, opts.show_hardware_cursor);
            if self.last_cursor != Some(desired) {
                self.emit_cursor(&mut out, desired);
            }
            return Ok(RenderOutput {
                bytes: out,
                strategy: Strategy::NoOp,
            });
        }

        out.push_str(SYNC_BEGIN);
        match plan {
            Plan::HardReset { clear } => {
                if clear {
                    out.push_str(CLEAR_ALL);
                }
                write_lines(&mut out, &lines, 0..len, false);
                self.hardware_cursor_row = len.saturating_sub(1);
                self.max_lines_rendered = if clear {
                    len
                } else {
                    self.max_lines_rendered.max(len)
                };
            }
            Plan::ViewportRepaint { start } => {
                move_rows(&mut out, self.hardware_cursor_row, self.viewport_top);
                out.push('\r');
                out.push_str(ERASE_DOWN);
                write_lines(&mut out, &lines, start..len, false);
                self.hardware_cursor_row = len.saturating_sub(1);
                self.max_lines_rendered = len;
            }
            Plan::AppendScroll { from } => {
                if from == 0 {
                    move_rows(&mut out, self.hardware_cursor_row, 0);
                    out.push('\r');
                    write_lines(&mut out, &lines, 0..len, true);
                } else {
                    move_rows(&mut out, self.hardware_cursor_row, from - 1);
                    for line in &lines[from..] {
                        out.push_str("\r\n");
                        out.push_str(ERASE_LINE);
                        push_line(&mut out, line);
                    }
                }
                self.hardware_cursor_row = len - 1;
                self.max_lines_rendered = self.max_lines_rendered.max(len);
            }
            Plan::IncrementalDiff { first, .. } => {
                let rows = plan.write_range(len);
                if !rows.is_empty() {
                    move_rows(&mut out, self.hardware_cursor_row, first);
                    out.push('\r');
                    self.hardware_cursor_row = rows.end - 1;
                    write_lines(&mut out, &lines, rows, true);
                }
                let previous_len = self.committed_lines().len();
                if len < previous_len {
                    self.erase_after(&mut out, len);
                }
                self.max_lines_rendered = self.max_lines_rendered.max(len);
            }
            Plan::NoOp => {}
        }
        self.viewport_top = self.max_lines_rendered.saturating_sub(height);

        let desired = self.desired_cursor(cursor, len, width, opts.show_hardware_cursor);
        self.emit_cursor(&mut out, desired);
        out.push_str(SYNC_END);

        self.clear_requested = false;
        self.committed = Some(CommittedFrame {
            lines,
            width,
            height,
        });

        Ok(RenderOutput {
            bytes: out,
            strategy: plan.strategy(),
        })
    }

    fn plan(&self, lines: &[String], opts: &RenderOptions, height: usize) -> (Plan, &'static str) {
        let Some(previous) = self.committed.as_ref() else {
            return (
                Plan::HardReset {
                    clear: self.clear_requested,
                },
                "first render",
            );
        };
        let len = lines.len();

        if previous.width != opts.width {
            return (Plan::HardReset { clear: true }, "width changed");
        }
        if previous.height != height {
            return (
                Plan::ViewportRepaint {
                    start: self.repaint_start(len, height),
                },
                "height changed",
            );
        }
        if opts.clear_on_shrink && len < self.max_lines_rendered && !opts.has_overlays {
            return (Plan::HardReset { clear: true }, "clear on shrink");
        }

        let previous_len = previous.lines.len();
        let mut first_changed = None;
        let mut last_changed = 0;
        for row in 0..len.max(previous_len) {
            if lines.get(row) != previous.lines.get(row) {
                first_changed.get_or_insert(row);
                last_changed = row;
            }
        }
        let Some(first) = first_changed else {
            return (Plan::NoOp, "unchanged");
        };

        let repaint = Plan::ViewportRepaint {
            start: self.repaint_start(len, height),
        };
        if first == previous_len {
            if previous_len > 0 && previous_len - 1 < self.viewport_top {
                return (repaint, "append point above viewport");
            }
            return (Plan::AppendScroll { from: first }, "lines appended");
        }
        if first < self.viewport_top {
            return (repaint, "change above viewport");
        }
        if len < previous_len && self.viewport_top > 0 {
            return (repaint, "shrank after overflow");
        }
        (
            Plan::IncrementalDiff {
                first,
                last: last_changed,
            },
            "changed span",
        )
    }

    /// First frame line written by a viewport repaint. Once content has scrolled, the owned
    /// region starts at screen row 0 and only the bottom `height` lines fit.
    fn repaint_start(&self, len: usize, height: usize) -> usize {
        if self.viewport_top > 0 {
            len.saturating_sub(height)
        } else {
            0
        }
    }

    /// Erases committed rows from `len` down; leaves the cursor on the new last line.
    fn erase_after(&mut self, out: &mut String, len: usize) {
        if len == 0 {
            move_rows(out, self.hardware_cursor_row, 0);
            out.push('\r');
            out.push_str(ERASE_DOWN);
            self.hardware_cursor_row = 0;
            return;
        }
        move_rows(out, self.hardware_cursor_row, len - 1);
        // Step onto the first stale row before erasing: ED at a pending-wrap position would
        // also erase the last column of the line just written.
        out.push_str("\x1b[1B\r");
        out.push_str(ERASE_DOWN);
        out.push_str("\x1b[1A");
        self.hardware_cursor_row = len - 1;
    }

    fn desired_cursor(
        &self,
        cursor: Option<CursorPos>,
        len: usize,
        width: usize,
        show: bool,
    ) -> CursorState {
        match cursor {
            Some(pos) if pos.row < len && pos.row >= self.viewport_top => CursorState::Placed {
                row: pos.row,
                col: pos.col.min(width.saturating_sub(1)),
                visible: show,
            },
            _ => CursorState::Hidden,
        }
    }

    fn emit_cursor(&mut self, out: &mut String, state: CursorState) {
        match state {
            CursorState::Hidden => out.push_str(HIDE_CURSOR),
            CursorState::Placed { row, col, visible } => {
                move_rows(out, self.hardware_cursor_row, row);
                self.hardware_cursor_row = row;
                let _ = write!(out, "\x1b[{}G", col + 1);
                out.push_str(if visible { SHOW_CURSOR } else { HIDE_CURSOR });
            }
        }
        self.last_cursor = Some(state);
    }
}

fn check_widths(lines: &[String], rows: Range<usize>, width: usize) -> Result<(), RenderError> {
    for row in rows {
        let line = &lines[row];
        if is_image_line(line) {
            continue;
        }
        let line_width = visible_width(line);
        if line_width > width {
            return Err(RenderError::WidthOverflow {
                row,
                line_width,
                terminal_width: width,
            });
        }
    }
    Ok(())
}

fn move_rows(out: &mut String, from: usize, to: usize) {
    if to > from {
        let _ = write!(out, "\x1b[{}B", to - from);
    } else if from > to {
        let _ = write!(out, "\x1b[{}A", from - to);
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    if !is_image_line(line) {
        out.push_str(SEGMENT_RESET);
    }
}

fn write_lines(out: &mut String, lines: &[String], rows: Range<usize>, erase: bool) {
    let start = rows.start;
    for row in rows {
        if row > start {
            out.push_str("\r\n");
        }
        if erase {
            out.push_str(ERASE_LINE);
        }
        push_line(out, &lines[row]);
    }
}

#[cfg(test)]
mod tests {
    use super::{DiffRenderer, RenderOptions, Strategy};
    use crate::core::cursor::{CursorPos, CURSOR_MARKER};
    use crate::core::output::{
        CLEAR_ALL, ERASE_DOWN, HIDE_CURSOR, SEGMENT_RESET, SHOW_CURSOR, SYNC_BEGIN, SYNC_END,
    };
    use crate::error::RenderError;
    use pretty_assertions::assert_eq;

    fn frame(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("line {i}")).collect()
    }

    fn opts(width: usize, height: usize) -> RenderOptions {
        RenderOptions::new(width, height)
    }

    #[test]
    fn first_render_writes_every_line_without_clearing() {
        let mut renderer = DiffRenderer::new();
        let out = renderer
            .render(numbered(5), &opts(80, 24))
            .expect("render");

        assert_eq!(out.strategy, Strategy::HardReset { clear: false });
        let body = (0..5)
            .map(|i| format!("line {i}{SEGMENT_RESET}"))
            .collect::<Vec<_>>()
            .join("\r\n");
        assert_eq!(out.bytes, format!("{SYNC_BEGIN}{body}{HIDE_CURSOR}{SYNC_END}"));
        assert!(!out.bytes.contains("\x1b[3J"));
        assert_eq!(renderer.hardware_cursor_row(), 4);
    }

    #[test]
    fn single_changed_line_is_rewritten_in_place() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(10), &opts(80, 24)).expect("first");

        let mut next = numbered(10);
        next[7] = "changed".to_string();
        let out = renderer.render(next, &opts(80, 24)).expect("second");

        assert_eq!(out.strategy, Strategy::IncrementalDiff);
        assert_eq!(
            out.bytes,
            format!("{SYNC_BEGIN}\x1b[2A\r\x1b[2Kchanged{SEGMENT_RESET}{HIDE_CURSOR}{SYNC_END}")
        );
        assert_eq!(renderer.hardware_cursor_row(), 7);
    }

    #[test]
    fn width_change_clears_scrollback() {
        let mut renderer = DiffRenderer::new();
        renderer.render(frame(&["a"]), &opts(80, 24)).expect("first");
        let out = renderer.render(frame(&["a"]), &opts(100, 24)).expect("second");

        assert_eq!(out.strategy, Strategy::HardReset { clear: true });
        assert!(out.bytes.starts_with(&format!("{SYNC_BEGIN}{CLEAR_ALL}")));
    }

    #[test]
    fn identical_frame_is_noop_with_no_bytes() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(3), &opts(80, 24)).expect("first");
        let out = renderer.render(numbered(3), &opts(80, 24)).expect("second");

        assert_eq!(out.strategy, Strategy::NoOp);
        assert_eq!(out.bytes, "");
    }

    #[test]
    fn appended_lines_write_only_the_tail() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(3), &opts(80, 24)).expect("first");
        let out = renderer.render(numbered(5), &opts(80, 24)).expect("second");

        assert_eq!(out.strategy, Strategy::AppendScroll);
        assert_eq!(
            out.bytes,
            format!(
                "{SYNC_BEGIN}\r\n\x1b[2Kline 3{SEGMENT_RESET}\r\n\x1b[2Kline 4{SEGMENT_RESET}{HIDE_CURSOR}{SYNC_END}"
            )
        );
        assert_eq!(renderer.hardware_cursor_row(), 4);
    }

    #[test]
    fn height_change_repaints_viewport() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(5), &opts(80, 24)).expect("first");
        let out = renderer.render(numbered(5), &opts(80, 30)).expect("second");

        assert_eq!(out.strategy, Strategy::ViewportRepaint);
        assert!(out.bytes.starts_with(&format!("{SYNC_BEGIN}\x1b[4A\r{ERASE_DOWN}line 0")));
        assert!(!out.bytes.contains(CLEAR_ALL));
    }

    #[test]
    fn change_above_viewport_repaints_visible_slice() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(30), &opts(80, 10)).expect("first");
        assert_eq!(renderer.viewport_top(), 20);

        let mut next = numbered(30);
        next[2] = "scrolled away".to_string();
        let out = renderer.render(next, &opts(80, 10)).expect("second");

        assert_eq!(out.strategy, Strategy::ViewportRepaint);
        assert!(out.bytes.contains("line 20"));
        assert!(!out.bytes.contains("line 19"));
        assert!(!out.bytes.contains("scrolled away"));
        assert_eq!(renderer.viewport_top(), 20);
    }

    #[test]
    fn shrinking_after_overflow_repaints() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(30), &opts(80, 10)).expect("first");
        let out = renderer.render(numbered(4), &opts(80, 10)).expect("second");

        assert_eq!(out.strategy, Strategy::ViewportRepaint);
        assert!(out.bytes.contains("line 0"));
        assert_eq!(renderer.viewport_top(), 0);
        assert_eq!(renderer.max_lines_rendered(), 4);
    }

    #[test]
    fn shrinking_within_screen_erases_stale_rows() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(6), &opts(80, 24)).expect("first");
        let out = renderer.render(numbered(3), &opts(80, 24)).expect("second");

        assert_eq!(out.strategy, Strategy::IncrementalDiff);
        assert_eq!(
            out.bytes,
            format!("{SYNC_BEGIN}\x1b[3A\x1b[1B\r{ERASE_DOWN}\x1b[1A{HIDE_CURSOR}{SYNC_END}")
        );
        assert_eq!(renderer.hardware_cursor_row(), 2);
        assert_eq!(renderer.max_lines_rendered(), 6);
    }

    #[test]
    fn clear_on_shrink_resets_unless_overlays_are_shown() {
        let mut renderer = DiffRenderer::new();
        let mut options = opts(80, 24);
        options.clear_on_shrink = true;
        renderer.render(numbered(6), &options).expect("first");

        options.has_overlays = true;
        let out = renderer.render(numbered(5), &options).expect("overlay");
        assert_eq!(out.strategy, Strategy::IncrementalDiff);

        options.has_overlays = false;
        let out = renderer.render(numbered(4), &options).expect("shrink");
        assert_eq!(out.strategy, Strategy::HardReset { clear: true });
        assert_eq!(renderer.max_lines_rendered(), 4);
    }

    #[test]
    fn overflowing_line_fails_without_committing() {
        let mut renderer = DiffRenderer::new();
        renderer.render(frame(&["12345"]), &opts(5, 5)).expect("first");

        let err = renderer
            .render(frame(&["abcdef"]), &opts(5, 5))
            .expect_err("overflow");
        assert_eq!(
            err,
            RenderError::WidthOverflow {
                row: 0,
                line_width: 6,
                terminal_width: 5,
            }
        );
        assert_eq!(renderer.committed_lines(), frame(&["12345"]).as_slice());

        let out = renderer.render(frame(&["abcde"]), &opts(5, 5)).expect("retry");
        assert_eq!(out.strategy, Strategy::IncrementalDiff);
    }

    #[test]
    fn unchanged_wide_lines_outside_the_diff_are_not_rechecked() {
        let mut renderer = DiffRenderer::new();
        renderer
            .render(frame(&["fits", "ok"]), &opts(5, 5))
            .expect("first");
        let out = renderer
            .render(frame(&["fits", "ok!"]), &opts(5, 5))
            .expect("second");
        assert_eq!(out.strategy, Strategy::IncrementalDiff);
    }

    #[test]
    fn image_lines_skip_width_check_and_segment_reset() {
        let mut renderer = DiffRenderer::new();
        let image = format!("\x1b_Ga=T,f=100;{}\x1b\\", "A".repeat(200));
        let out = renderer
            .render(vec![image.clone()], &opts(10, 5))
            .expect("image");
        assert!(out.bytes.contains(&image));
        assert!(!out.bytes.contains(&format!("{image}{SEGMENT_RESET}")));
    }

    #[test]
    fn cursor_marker_places_hardware_cursor() {
        let mut renderer = DiffRenderer::new();
        let mut options = opts(80, 24);
        options.show_hardware_cursor = true;
        let out = renderer
            .render(
                vec!["first".to_string(), format!("> ab{CURSOR_MARKER}c")],
                &options,
            )
            .expect("render");

        assert!(!out.bytes.contains(CURSOR_MARKER));
        assert!(out.bytes.ends_with(&format!("\x1b[5G{SHOW_CURSOR}{SYNC_END}")));
        assert_eq!(renderer.hardware_cursor_row(), 1);
    }

    #[test]
    fn typed_cursor_wins_over_marker_and_marker_is_still_stripped() {
        let mut renderer = DiffRenderer::new();
        let mut options = opts(80, 24);
        options.cursor = Some(CursorPos { row: 0, col: 2 });
        let out = renderer
            .render(vec!["top".to_string(), format!("x{CURSOR_MARKER}")], &options)
            .expect("render");

        assert!(!out.bytes.contains(CURSOR_MARKER));
        assert!(out.bytes.ends_with(&format!("\x1b[1A\x1b[3G{HIDE_CURSOR}{SYNC_END}")));
        assert_eq!(renderer.hardware_cursor_row(), 0);
    }

    #[test]
    fn noop_emits_cursor_only_when_it_moves() {
        let mut renderer = DiffRenderer::new();
        let mut options = opts(80, 24);
        options.cursor = Some(CursorPos { row: 1, col: 0 });
        renderer.render(numbered(2), &options).expect("first");

        let same = renderer.render(numbered(2), &options).expect("same");
        assert_eq!(same.strategy, Strategy::NoOp);
        assert_eq!(same.bytes, "");

        options.cursor = Some(CursorPos { row: 0, col: 4 });
        let moved = renderer.render(numbered(2), &options).expect("moved");
        assert_eq!(moved.strategy, Strategy::NoOp);
        assert_eq!(moved.bytes, format!("\x1b[1A\x1b[5G{HIDE_CURSOR}"));

        options.cursor = None;
        let hidden = renderer.render(numbered(2), &options).expect("hidden");
        assert_eq!(hidden.bytes, HIDE_CURSOR);
        let again = renderer.render(numbered(2), &options).expect("again");
        assert_eq!(again.bytes, "");
    }

    #[test]
    fn cursor_column_is_clamped_to_width() {
        let mut renderer = DiffRenderer::new();
        let mut options = opts(10, 5);
        options.cursor = Some(CursorPos { row: 0, col: 50 });
        let out = renderer.render(frame(&["abc"]), &options).expect("render");
        assert!(out.bytes.contains("\x1b[10G"));
    }

    #[test]
    fn full_redraw_request_clears_even_when_identical() {
        let mut renderer = DiffRenderer::new();
        renderer.render(numbered(2), &opts(80, 24)).expect("first");
        renderer.request_full_redraw();
        assert!(renderer.committed_lines().is_empty());

        let out = renderer.render(numbered(2), &opts(80, 24)).expect("forced");
        assert_eq!(out.strategy, Strategy::HardReset { clear: true });

        let out = renderer.render(numbered(2), &opts(80, 24)).expect("after");
        assert_eq!(out.strategy, Strategy::NoOp);
    }

    #[test]
    fn cursor_below_content_moves_past_last_line() {
        let mut renderer = DiffRenderer::new();
        let mut options = opts(80, 24);
        options.cursor = Some(CursorPos { row: 0, col: 0 });
        renderer.render(numbered(3), &options).expect("render");

        assert_eq!(renderer.cursor_below_content(), "\x1b[2B\r\n");
        assert_eq!(renderer.hardware_cursor_row(), 3);
    }
}
