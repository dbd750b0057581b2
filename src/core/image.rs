//! Inline image escape sequences.
//!
//! Image lines are opaque to the renderer: they are never measured, sliced or spliced.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProtocol {
    Kitty,
    Iterm2,
    Sixel,
}

impl ImageProtocol {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kitty" => Some(Self::Kitty),
            "iterm2" | "iterm" => Some(Self::Iterm2),
            "sixel" => Some(Self::Sixel),
            _ => None,
        }
    }
}

/// Pixel size of one terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellDimensions {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for CellDimensions {
    fn default() -> Self {
        Self {
            width_px: 9,
            height_px: 18,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width_px: u32,
    pub height_px: u32,
}

const KITTY_PREFIX: &str = "\x1b_G";
const ITERM2_PREFIX: &str = "\x1b]1337;File=";
const SIXEL_PREFIX: &str = "\x1bP";
const KITTY_CHUNK: usize = 4096;

pub fn is_image_line(line: &str) -> bool {
    line.contains(KITTY_PREFIX) || line.contains(ITERM2_PREFIX) || is_sixel(line)
}

/// DCS with a `q` final after numeric parameters.
fn is_sixel(line: &str) -> bool {
    line.match_indices(SIXEL_PREFIX).any(|(idx, _)| {
        line[idx + SIXEL_PREFIX.len()..]
            .bytes()
            .find(|b| !(b.is_ascii_digit() || *b == b';'))
            == Some(b'q')
    })
}

/// Transmits and places a PNG with the Kitty graphics protocol.
///
/// The payload is split into 4096 byte base64 chunks; only the first carries the control keys.
pub fn encode_kitty(png: &[u8], columns: u32, rows: u32, image_id: Option<u32>) -> String {
    let payload = STANDARD.encode(png);
    let mut keys = format!("a=T,f=100,q=2,c={columns},r={rows}");
    if let Some(id) = image_id {
        keys.push_str(&format!(",i={id}"));
    }

    let chunks: Vec<&str> = payload
        .as_bytes()
        .chunks(KITTY_CHUNK)
        // base64 output is ASCII.
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();
    if chunks.is_empty() {
        return format!("{KITTY_PREFIX}{keys};\x1b\\");
    }

    let mut out = String::with_capacity(payload.len() + chunks.len() * 16);
    let last = chunks.len() - 1;
    for (idx, chunk) in chunks.iter().enumerate() {
        let more = u8::from(idx != last);
        if idx == 0 {
            out.push_str(&format!("{KITTY_PREFIX}{keys},m={more};{chunk}\x1b\\"));
        } else {
            out.push_str(&format!("{KITTY_PREFIX}m={more};{chunk}\x1b\\"));
        }
    }
    out
}

pub fn delete_kitty_image(image_id: u32) -> String {
    format!("{KITTY_PREFIX}a=d,d=I,i={image_id},q=2\x1b\\")
}

pub fn delete_all_kitty_images() -> String {
    format!("{KITTY_PREFIX}a=d,d=A,q=2\x1b\\")
}

/// Inline file transfer for iTerm2 (and WezTerm), sized in cells.
pub fn encode_iterm2(data: &[u8], columns: u32, name: Option<&str>) -> String {
    let mut args = format!("inline=1;size={};width={columns};preserveAspectRatio=1", data.len());
    if let Some(name) = name {
        args.push_str(";name=");
        args.push_str(&STANDARD.encode(name.as_bytes()));
    }
    format!("{ITERM2_PREFIX}{args}:{}\x07", STANDARD.encode(data))
}

/// Rows an image occupies when scaled to `columns` cells wide.
pub fn calculate_image_rows(image: ImageDimensions, columns: u32, cell: CellDimensions) -> u32 {
    if image.width_px == 0 || cell.height_px == 0 {
        return 1;
    }
    let target_width_px = u64::from(columns) * u64::from(cell.width_px);
    let scaled_height_px = u64::from(image.height_px) * target_width_px / u64::from(image.width_px);
    let rows = scaled_height_px.div_ceil(u64::from(cell.height_px));
    u32::try_from(rows.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        calculate_image_rows, delete_kitty_image, encode_iterm2, encode_kitty, is_image_line,
        CellDimensions, ImageDimensions, ImageProtocol,
    };

    #[test]
    fn image_line_detection_matches_prefixes() {
        assert!(is_image_line("\x1b_Gf=100;data"));
        assert!(is_image_line("prefix\x1b]1337;File=data"));
        assert!(is_image_line("\x1bP0;1;0q\"1;1;4;4#0~\x1b\\"));
        assert!(!is_image_line("\x1bP1$r0m\x1b\\"));
        assert!(!is_image_line("plain text"));
    }

    #[test]
    fn kitty_encoding_chunks_large_payloads() {
        let png = vec![0u8; 6000];
        let encoded = encode_kitty(&png, 20, 5, Some(7));
        let parts: Vec<&str> = encoded.split("\x1b\\").filter(|p| !p.is_empty()).collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("\x1b_Ga=T,f=100,q=2,c=20,r=5,i=7,m=1;"));
        assert!(parts[1].starts_with("\x1b_Gm=0;"));
    }

    #[test]
    fn kitty_small_payload_is_single_chunk() {
        let encoded = encode_kitty(b"abc", 1, 1, None);
        assert_eq!(encoded, "\x1b_Ga=T,f=100,q=2,c=1,r=1,m=0;YWJj\x1b\\");
    }

    #[test]
    fn iterm2_encoding_sizes_in_cells() {
        let encoded = encode_iterm2(b"abc", 10, None);
        assert_eq!(
            encoded,
            "\x1b]1337;File=inline=1;size=3;width=10;preserveAspectRatio=1:YWJj\x07"
        );
        assert_eq!(delete_kitty_image(3), "\x1b_Ga=d,d=I,i=3,q=2\x1b\\");
    }

    #[test]
    fn rows_follow_aspect_ratio() {
        let cell = CellDimensions::default();
        let image = ImageDimensions {
            width_px: 180,
            height_px: 90,
        };
        // 10 columns = 90px wide -> 45px tall -> 3 rows of 18px.
        assert_eq!(calculate_image_rows(image, 10, cell), 3);
        let empty = ImageDimensions {
            width_px: 0,
            height_px: 0,
        };
        assert_eq!(calculate_image_rows(empty, 10, cell), 1);
    }

    #[test]
    fn protocol_names_parse() {
        assert_eq!(ImageProtocol::parse("Kitty"), Some(ImageProtocol::Kitty));
        assert_eq!(ImageProtocol::parse("iterm2"), Some(ImageProtocol::Iterm2));
        assert_eq!(ImageProtocol::parse("none"), None);
    }
}
