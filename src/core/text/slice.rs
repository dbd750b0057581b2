//! Column-range slicing that keeps escape sequences intact.

use unicode_segmentation::UnicodeSegmentation;

use super::ansi::{tokens, StyleTracker, Token};
use super::width::grapheme_width;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceResult {
    pub text: String,
    pub width: usize,
}

/// The parts of a line to the left and right of a column span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub before: String,
    pub before_width: usize,
    pub after: String,
    pub after_width: usize,
}

pub fn slice_by_column(line: &str, start_col: usize, length: usize, strict: bool) -> String {
    slice_with_width(line, start_col, length, strict).text
}

/// Takes columns `[start_col, start_col + length)`.
///
/// With `strict`, a wide grapheme straddling the end boundary is dropped instead of overflowing.
/// Escapes that precede the range are carried into the result ahead of the first grapheme.
pub fn slice_with_width(line: &str, start_col: usize, length: usize, strict: bool) -> SliceResult {
    let mut result = SliceResult {
        text: String::new(),
        width: 0,
    };
    if length == 0 {
        return result;
    }

    let end_col = start_col.saturating_add(length);
    let mut col = 0;
    let mut pending = String::new();

    'outer: for token in tokens(line) {
        match token {
            Token::Escape(code) => {
                pending.push_str(code);
                if col >= start_col {
                    result.text.push_str(&pending);
                    pending.clear();
                }
            }
            Token::Text(text) => {
                for grapheme in text.graphemes(true) {
                    let width = grapheme_width(grapheme);
                    if col >= start_col && (!strict || col + width <= end_col) {
                        result.text.push_str(&pending);
                        pending.clear();
                        result.text.push_str(grapheme);
                        result.width += width;
                    }
                    col += width;
                    if col >= end_col {
                        break 'outer;
                    }
                }
            }
        }
    }
    result
}

/// Splits `line` around an overlay span.
///
/// `before` holds columns `[0, before_end)`; `after` holds up to `after_len` columns from
/// `after_start`, prefixed with the style active at that column so it renders as it did in the
/// original line.
pub fn extract_segments(
    line: &str,
    before_end: usize,
    after_start: usize,
    after_len: usize,
    strict_after: bool,
) -> Segments {
    let mut segments = Segments {
        before: String::new(),
        before_width: 0,
        after: String::new(),
        after_width: 0,
    };
    let after_end = after_start.saturating_add(after_len);
    let stop_col = if after_len == 0 { before_end } else { after_end };
    if stop_col == 0 {
        return segments;
    }

    let mut tracker = StyleTracker::default();
    let mut pending_before = String::new();
    let mut after_started = false;
    let mut col = 0;

    'outer: for token in tokens(line) {
        match token {
            Token::Escape(code) => {
                tracker.process(code);
                if col < before_end {
                    pending_before.push_str(code);
                } else if after_started && col < after_end {
                    segments.after.push_str(code);
                }
            }
            Token::Text(text) => {
                for grapheme in text.graphemes(true) {
                    let width = grapheme_width(grapheme);
                    if col < before_end {
                        segments.before.push_str(&pending_before);
                        pending_before.clear();
                        segments.before.push_str(grapheme);
                        segments.before_width += width;
                    } else if col >= after_start
                        && col < after_end
                        && (!strict_after || col + width <= after_end)
                    {
                        if !after_started {
                            segments.after.push_str(&tracker.active_codes());
                            after_started = true;
                        }
                        segments.after.push_str(grapheme);
                        segments.after_width += width;
                    }
                    col += width;
                    if col >= stop_col {
                        break 'outer;
                    }
                }
            }
        }
    }
    segments
}
