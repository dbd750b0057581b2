//! Incremental scanners for terminal replies interleaved with keystrokes.
//!
//! A scanner consumes input chunk by chunk. Complete replies it recognizes are extracted, every
//! other byte passes through in order, and an unfinished sequence at the very end of a chunk is
//! retained only while it could still grow into one of its replies.

use std::marker::PhantomData;

use crate::core::image::CellDimensions;

/// Replies are short; anything longer is not a reply.
const MAX_PARAMS_LEN: usize = 64;

#[derive(Debug, PartialEq, Eq)]
enum CsiMatch<'a> {
    Complete {
        len: usize,
        private: bool,
        params: &'a str,
        final_byte: u8,
    },
    /// The buffer ended inside a well-formed prefix. `private` is `None` if it ended before the
    /// private marker position.
    Partial {
        private: Option<bool>,
        params: &'a str,
    },
    Mismatch,
}

/// Matches `ESC [ [?] <digits ; :> <final>` at `pos`, which must hold an ESC.
fn match_csi_reply(buf: &str, pos: usize) -> CsiMatch<'_> {
    let bytes = buf.as_bytes();
    let mut idx = pos + 1;
    if idx == bytes.len() {
        return CsiMatch::Partial {
            private: None,
            params: "",
        };
    }
    if bytes[idx] != b'[' {
        return CsiMatch::Mismatch;
    }
    idx += 1;
    if idx == bytes.len() {
        return CsiMatch::Partial {
            private: None,
            params: "",
        };
    }
    let private = bytes[idx] == b'?';
    if private {
        idx += 1;
    }
    let params_start = idx;
    while idx < bytes.len() && matches!(bytes[idx], b'0'..=b'9' | b';' | b':') {
        idx += 1;
        if idx - params_start > MAX_PARAMS_LEN {
            return CsiMatch::Mismatch;
        }
    }
    let params = &buf[params_start..idx];
    if idx == bytes.len() {
        return CsiMatch::Partial {
            private: Some(private),
            params,
        };
    }
    let final_byte = bytes[idx];
    if (0x40..=0x7e).contains(&final_byte) {
        CsiMatch::Complete {
            len: idx + 1 - pos,
            private,
            params,
            final_byte,
        }
    } else {
        CsiMatch::Mismatch
    }
}

/// One protocol's reply grammar.
pub trait ReplyPattern {
    type Reply;

    /// Decodes a complete CSI sequence if it is this protocol's reply.
    fn parse(private: bool, params: &str, final_byte: u8) -> Option<Self::Reply>;

    /// Whether an unfinished sequence can still become this protocol's reply.
    fn could_be(private: Option<bool>, params: &str) -> bool;
}

#[derive(Debug, PartialEq, Eq)]
pub struct Scan<T> {
    pub passthrough: String,
    pub found: Vec<T>,
}

impl<T> Default for Scan<T> {
    fn default() -> Self {
        Self {
            passthrough: String::new(),
            found: Vec::new(),
        }
    }
}

pub struct ReplyScanner<P: ReplyPattern> {
    tail: String,
    _pattern: PhantomData<P>,
}

impl<P: ReplyPattern> Default for ReplyScanner<P> {
    fn default() -> Self {
        Self {
            tail: String::new(),
            _pattern: PhantomData,
        }
    }
}

impl<P: ReplyPattern> ReplyScanner<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, chunk: &str) -> Scan<P::Reply> {
        let mut buf = std::mem::take(&mut self.tail);
        buf.push_str(chunk);

        let mut out = Scan::default();
        let mut emitted = 0;
        let mut search = 0;
        while let Some(offset) = buf[search..].find('\x1b') {
            let pos = search + offset;
            search = pos + 1;
            match match_csi_reply(&buf, pos) {
                CsiMatch::Complete {
                    len,
                    private,
                    params,
                    final_byte,
                } => {
                    if let Some(reply) = P::parse(private, params, final_byte) {
                        out.passthrough.push_str(&buf[emitted..pos]);
                        out.found.push(reply);
                        emitted = pos + len;
                        search = emitted;
                    }
                }
                CsiMatch::Partial { private, params } => {
                    if P::could_be(private, params) {
                        out.passthrough.push_str(&buf[emitted..pos]);
                        self.tail = buf[pos..].to_string();
                        return out;
                    }
                }
                CsiMatch::Mismatch => {}
            }
        }
        out.passthrough.push_str(&buf[emitted..]);
        out
    }

    /// Gives up on the retained tail and returns it as ordinary input.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.tail)
    }

    pub fn has_tail(&self) -> bool {
        !self.tail.is_empty()
    }
}

fn digits_only(params: &str) -> bool {
    params.bytes().all(|b| b.is_ascii_digit())
}

fn digits_and_semicolons(params: &str) -> bool {
    params.bytes().all(|b| b.is_ascii_digit() || b == b';')
}

/// `CSI ? <flags> u`, the answer to a keyboard-flags query.
pub struct KittyFlags;

impl ReplyPattern for KittyFlags {
    type Reply = u32;

    fn parse(private: bool, params: &str, final_byte: u8) -> Option<u32> {
        if !private || final_byte != b'u' || params.is_empty() || !digits_only(params) {
            return None;
        }
        params.parse().ok()
    }

    fn could_be(private: Option<bool>, params: &str) -> bool {
        private != Some(false) && digits_only(params)
    }
}

/// Answers to the sixel dual probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SixelAnswer {
    /// Primary device attributes; `true` if attribute 4 (sixel) is listed.
    DeviceAttributes(bool),
    /// XTSMGRAPHICS geometry read; `true` if the status is success.
    GraphicsAttributes(bool),
}

impl SixelAnswer {
    pub fn supports_sixel(self) -> bool {
        match self {
            Self::DeviceAttributes(yes) | Self::GraphicsAttributes(yes) => yes,
        }
    }
}

pub struct SixelProbe;

impl ReplyPattern for SixelProbe {
    type Reply = SixelAnswer;

    fn parse(private: bool, params: &str, final_byte: u8) -> Option<SixelAnswer> {
        if !private || !digits_and_semicolons(params) {
            return None;
        }
        match final_byte {
            b'c' => Some(SixelAnswer::DeviceAttributes(
                params.split(';').skip(1).any(|attr| attr == "4"),
            )),
            b'S' => {
                let mut fields = params.split(';');
                if fields.next() != Some("2") {
                    return None;
                }
                Some(SixelAnswer::GraphicsAttributes(fields.next() == Some("0")))
            }
            _ => None,
        }
    }

    fn could_be(private: Option<bool>, params: &str) -> bool {
        private != Some(false) && digits_and_semicolons(params)
    }
}

/// `CSI 6 ; <height> ; <width> t`, the text-area cell size in pixels.
pub struct CellSize;

impl ReplyPattern for CellSize {
    type Reply = CellDimensions;

    fn parse(private: bool, params: &str, final_byte: u8) -> Option<CellDimensions> {
        if private || final_byte != b't' {
            return None;
        }
        let mut fields = params.split(';');
        if fields.next() != Some("6") {
            return None;
        }
        let height_px: u32 = fields.next()?.parse().ok()?;
        let width_px: u32 = fields.next()?.parse().ok()?;
        if fields.next().is_some() || height_px == 0 || width_px == 0 {
            return None;
        }
        Some(CellDimensions {
            width_px,
            height_px,
        })
    }

    fn could_be(private: Option<bool>, params: &str) -> bool {
        private != Some(true)
            && digits_and_semicolons(params)
            && (params.is_empty() || params == "6" || params.starts_with("6;"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    Dark,
    Light,
}

/// `CSI ? 997 ; 1 n` (dark) or `CSI ? 997 ; 2 n` (light).
pub struct AppearanceReport;

impl ReplyPattern for AppearanceReport {
    type Reply = Appearance;

    fn parse(private: bool, params: &str, final_byte: u8) -> Option<Appearance> {
        if !private || final_byte != b'n' {
            return None;
        }
        match params {
            "997;1" => Some(Appearance::Dark),
            "997;2" => Some(Appearance::Light),
            _ => None,
        }
    }

    fn could_be(private: Option<bool>, params: &str) -> bool {
        private != Some(false) && ("997;1".starts_with(params) || "997;2".starts_with(params))
    }
}

pub type KittyReplyScanner = ReplyScanner<KittyFlags>;
pub type SixelReplyScanner = ReplyScanner<SixelProbe>;
pub type CellSizeScanner = ReplyScanner<CellSize>;
pub type AppearanceScanner = ReplyScanner<AppearanceReport>;

#[cfg(test)]
mod tests {
    use super::*;

    mod kitty {
        use super::*;

        #[test]
        fn extracts_reply_and_keeps_surrounding_keys() {
            let mut scanner = KittyReplyScanner::new();
            let scan = scanner.scan("a\x1b[?1ub");
            assert_eq!(scan.found, vec![1]);
            assert_eq!(scan.passthrough, "ab");
            assert!(!scanner.has_tail());
        }

        #[test]
        fn reassembles_reply_split_across_chunks() {
            let mut scanner = KittyReplyScanner::new();
            let first = scanner.scan("x\x1b[?");
            assert_eq!(first.passthrough, "x");
            assert!(first.found.is_empty());
            assert!(scanner.has_tail());

            let second = scanner.scan("31");
            assert_eq!(second.passthrough, "");
            assert!(scanner.has_tail());

            let third = scanner.scan("uy");
            assert_eq!(third.found, vec![31]);
            assert_eq!(third.passthrough, "y");
        }

        #[test]
        fn disproved_tail_is_released_in_order() {
            let mut scanner = KittyReplyScanner::new();
            assert_eq!(scanner.scan("\x1b[?6").passthrough, "");
            let scan = scanner.scan("4;4c!");
            assert!(scan.found.is_empty());
            assert_eq!(scan.passthrough, "\x1b[?64;4c!");
        }

        #[test]
        fn keys_are_never_retained() {
            let mut scanner = KittyReplyScanner::new();
            let scan = scanner.scan("\x1b[A\x1b[97;5u\x1b[1;2");
            assert!(scan.found.is_empty());
            assert_eq!(scan.passthrough, "\x1b[A\x1b[97;5u\x1b[1;2");
            assert!(!scanner.has_tail());
        }

        #[test]
        fn lone_escape_is_held_until_flushed() {
            let mut scanner = KittyReplyScanner::new();
            assert_eq!(scanner.scan("\x1b").passthrough, "");
            assert_eq!(scanner.flush(), "\x1b");
            assert!(!scanner.has_tail());
        }
    }

    mod sixel {
        use super::*;

        #[test]
        fn device_attributes_with_sixel() {
            let mut scanner = SixelReplyScanner::new();
            let scan = scanner.scan("\x1b[?62;4;22c");
            assert_eq!(scan.found, vec![SixelAnswer::DeviceAttributes(true)]);
            assert_eq!(scan.passthrough, "");
        }

        #[test]
        fn device_attributes_without_sixel() {
            let mut scanner = SixelReplyScanner::new();
            let scan = scanner.scan("\x1b[?4c\x1b[?1;2c");
            // The first parameter is the device class, not an attribute.
            assert_eq!(
                scan.found,
                vec![
                    SixelAnswer::DeviceAttributes(false),
                    SixelAnswer::DeviceAttributes(false)
                ]
            );
        }

        #[test]
        fn graphics_attributes_status() {
            let mut scanner = SixelReplyScanner::new();
            let ok = scanner.scan("\x1b[?2;0;1000;1000S");
            assert_eq!(ok.found, vec![SixelAnswer::GraphicsAttributes(true)]);
            let err = scanner.scan("\x1b[?2;3;0S");
            assert_eq!(err.found, vec![SixelAnswer::GraphicsAttributes(false)]);
            let other_item = scanner.scan("\x1b[?1;0;256S");
            assert!(other_item.found.is_empty());
            assert_eq!(other_item.passthrough, "\x1b[?1;0;256S");
        }

        #[test]
        fn split_graphics_reply_with_trailing_input() {
            let mut scanner = SixelReplyScanner::new();
            assert_eq!(scanner.scan("k\x1b[?2;0;").passthrough, "k");
            let scan = scanner.scan("640;480Sq");
            assert_eq!(scan.found, vec![SixelAnswer::GraphicsAttributes(true)]);
            assert_eq!(scan.passthrough, "q");
        }
    }

    mod cell_size {
        use super::*;

        #[test]
        fn parses_height_then_width() {
            let mut scanner = CellSizeScanner::new();
            let scan = scanner.scan("\x1b[6;20;10t");
            assert_eq!(
                scan.found,
                vec![CellDimensions {
                    width_px: 10,
                    height_px: 20
                }]
            );
        }

        #[test]
        fn other_window_reports_pass_through() {
            let mut scanner = CellSizeScanner::new();
            let scan = scanner.scan("\x1b[4;600;800t\x1b[8;24;80t");
            assert!(scan.found.is_empty());
            assert_eq!(scan.passthrough, "\x1b[4;600;800t\x1b[8;24;80t");
        }

        #[test]
        fn partial_only_when_prefix_is_plausible() {
            let mut scanner = CellSizeScanner::new();
            assert_eq!(scanner.scan("\x1b[6;1").passthrough, "");
            assert!(scanner.has_tail());
            let scan = scanner.scan("8;9t");
            assert_eq!(scan.found.len(), 1);

            assert_eq!(scanner.scan("\x1b[8;2").passthrough, "\x1b[8;2");
            assert!(!scanner.has_tail());
            assert_eq!(scanner.scan("\x1b[?6").passthrough, "\x1b[?6");
        }

        #[test]
        fn zero_sizes_are_rejected() {
            let mut scanner = CellSizeScanner::new();
            let scan = scanner.scan("\x1b[6;0;0t");
            assert!(scan.found.is_empty());
        }
    }

    mod appearance {
        use super::*;

        #[test]
        fn parses_dark_and_light() {
            let mut scanner = AppearanceScanner::new();
            let scan = scanner.scan("\x1b[?997;1nabc\x1b[?997;2n");
            assert_eq!(scan.found, vec![Appearance::Dark, Appearance::Light]);
            assert_eq!(scan.passthrough, "abc");
        }

        #[test]
        fn retains_only_matching_prefixes() {
            let mut scanner = AppearanceScanner::new();
            assert_eq!(scanner.scan("\x1b[?99").passthrough, "");
            assert!(scanner.has_tail());
            let scan = scanner.scan("7;2n");
            assert_eq!(scan.found, vec![Appearance::Light]);

            assert_eq!(scanner.scan("\x1b[?98").passthrough, "\x1b[?98");
            assert!(!scanner.has_tail());
        }

        #[test]
        fn unknown_mode_value_passes_through() {
            let mut scanner = AppearanceScanner::new();
            let scan = scanner.scan("\x1b[?997;3n");
            assert!(scan.found.is_empty());
            assert_eq!(scan.passthrough, "\x1b[?997;3n");
        }
    }
}
