//! Column width of rendered text.

use emojis::get as emoji_get;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use super::ansi::{tokens, Token};

const TAB_WIDTH: usize = 3;

pub fn grapheme_width(grapheme: &str) -> usize {
    match grapheme {
        "" => 0,
        "\t" => TAB_WIDTH,
        _ if emoji_get(grapheme).is_some() => 2,
        _ => grapheme
            .chars()
            .map(|ch| {
                if ch == '\t' {
                    TAB_WIDTH
                } else {
                    UnicodeWidthChar::width(ch).unwrap_or(0)
                }
            })
            .sum(),
    }
}

/// Terminal columns occupied by `input`, ignoring escape sequences.
pub fn visible_width(input: &str) -> usize {
    if input.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return input.len();
    }
    tokens(input)
        .map(|token| match token {
            Token::Escape(_) => 0,
            Token::Text(text) => text.graphemes(true).map(grapheme_width).sum(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::visible_width;

    #[test]
    fn ansi_ignored_in_width() {
        assert_eq!(visible_width("hi\x1b[31m!!\x1b[0m"), 4);
    }

    #[test]
    fn osc8_ignored_in_width() {
        let input = "\x1b]8;;https://example.com\x07link\x1b]8;;\x07";
        assert_eq!(visible_width(input), 4);
    }

    #[test]
    fn wide_and_emoji_graphemes_take_two_columns() {
        assert_eq!(visible_width("😀"), 2);
        assert_eq!(visible_width("日本"), 4);
    }

    #[test]
    fn tabs_are_three_columns() {
        assert_eq!(visible_width("a\tb"), 5);
    }

    #[test]
    fn cursor_marker_is_zero_width() {
        assert_eq!(visible_width("ab\x1b_tape:c\x07cd"), 4);
    }
}
