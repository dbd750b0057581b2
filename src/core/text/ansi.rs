//! Escape-sequence tokenizing and SGR style tracking.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiKind {
    Csi,
    Osc,
    Apc,
    Dcs,
    Ss3,
}

/// A complete escape sequence found at some byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnsiCode {
    pub kind: AnsiKind,
    pub len: usize,
}

/// Returns the complete escape sequence starting at `pos`, if there is one.
///
/// Incomplete sequences return `None`; callers treat the lone ESC as ordinary (zero width) text.
pub fn extract_ansi_code(input: &str, pos: usize) -> Option<AnsiCode> {
    let bytes = input.as_bytes();
    if bytes.get(pos) != Some(&0x1b) {
        return None;
    }
    let (kind, end) = match *bytes.get(pos + 1)? {
        b'[' => (AnsiKind::Csi, csi_end(bytes, pos + 2)?),
        b']' => (AnsiKind::Osc, string_end(bytes, pos + 2)?),
        b'_' => (AnsiKind::Apc, string_end(bytes, pos + 2)?),
        b'P' => (AnsiKind::Dcs, string_end(bytes, pos + 2)?),
        b'O' if pos + 2 < bytes.len() => (AnsiKind::Ss3, pos + 3),
        _ => return None,
    };
    if !input.is_char_boundary(end) {
        return None;
    }
    Some(AnsiCode {
        kind,
        len: end - pos,
    })
}

fn csi_end(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|b| (0x40..=0x7e).contains(b))
        .map(|offset| from + offset + 1)
}

/// Terminated by BEL or ST (`ESC \`).
fn string_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut idx = from;
    while idx < bytes.len() {
        match bytes[idx] {
            0x07 => return Some(idx + 1),
            0x1b if bytes.get(idx + 1) == Some(&b'\\') => return Some(idx + 2),
            _ => idx += 1,
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Escape(&'a str),
    Text(&'a str),
}

/// Splits a line into maximal text runs and complete escape sequences.
pub fn tokens(input: &str) -> Tokens<'_> {
    Tokens { input, pos: 0 }
}

pub struct Tokens<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let start = self.pos;
        if start >= self.input.len() {
            return None;
        }
        if let Some(code) = extract_ansi_code(self.input, start) {
            self.pos += code.len;
            return Some(Token::Escape(&self.input[start..self.pos]));
        }

        let bytes = self.input.as_bytes();
        // Always consume at least one byte so a stray ESC becomes text.
        let mut end = start + 1;
        loop {
            match bytes[end..].iter().position(|&b| b == 0x1b) {
                None => {
                    end = self.input.len();
                    break;
                }
                Some(offset) => {
                    end += offset;
                    if extract_ansi_code(self.input, end).is_some() {
                        break;
                    }
                    end += 1;
                }
            }
        }
        self.pos = end;
        Some(Token::Text(&self.input[start..end]))
    }
}

const BOLD: u16 = 1 << 0;
const DIM: u16 = 1 << 1;
const ITALIC: u16 = 1 << 2;
const UNDERLINE: u16 = 1 << 3;
const BLINK: u16 = 1 << 4;
const INVERSE: u16 = 1 << 5;
const HIDDEN: u16 = 1 << 6;
const STRIKE: u16 = 1 << 7;

/// SGR parameter for each attribute bit, in emission order.
const ATTRIBUTES: [(u16, &str); 8] = [
    (BOLD, "1"),
    (DIM, "2"),
    (ITALIC, "3"),
    (UNDERLINE, "4"),
    (BLINK, "5"),
    (INVERSE, "7"),
    (HIDDEN, "8"),
    (STRIKE, "9"),
];

/// Tracks the SGR state active at a point in a line, so a slice taken mid-line can reopen it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleTracker {
    attrs: u16,
    fg: Option<String>,
    bg: Option<String>,
}

impl StyleTracker {
    /// Feeds one escape sequence; anything that is not SGR is ignored.
    pub fn process(&mut self, code: &str) {
        let Some(params) = code
            .strip_prefix("\x1b[")
            .and_then(|rest| rest.strip_suffix('m'))
        else {
            return;
        };
        if params.is_empty() {
            self.reset();
            return;
        }

        let parts: Vec<&str> = params.split(';').collect();
        let mut idx = 0;
        while idx < parts.len() {
            let code = parts[idx].parse::<u16>().unwrap_or(0);
            if code == 38 || code == 48 {
                let consumed = match parts.get(idx + 1) {
                    Some(&"5") if idx + 2 < parts.len() => 3,
                    Some(&"2") if idx + 4 < parts.len() => 5,
                    _ => 0,
                };
                if consumed > 0 {
                    let color = parts[idx..idx + consumed].join(";");
                    if code == 38 {
                        self.fg = Some(color);
                    } else {
                        self.bg = Some(color);
                    }
                    idx += consumed;
                    continue;
                }
            }

            match code {
                0 => self.reset(),
                1 => self.attrs |= BOLD,
                2 => self.attrs |= DIM,
                3 => self.attrs |= ITALIC,
                4 => self.attrs |= UNDERLINE,
                5 => self.attrs |= BLINK,
                7 => self.attrs |= INVERSE,
                8 => self.attrs |= HIDDEN,
                9 => self.attrs |= STRIKE,
                21 => self.attrs &= !BOLD,
                22 => self.attrs &= !(BOLD | DIM),
                23 => self.attrs &= !ITALIC,
                24 => self.attrs &= !UNDERLINE,
                25 => self.attrs &= !BLINK,
                27 => self.attrs &= !INVERSE,
                28 => self.attrs &= !HIDDEN,
                29 => self.attrs &= !STRIKE,
                39 => self.fg = None,
                49 => self.bg = None,
                30..=37 | 90..=97 => self.fg = Some(code.to_string()),
                40..=47 | 100..=107 => self.bg = Some(code.to_string()),
                _ => {}
            }
            idx += 1;
        }
    }

    /// A single SGR sequence reproducing the tracked state, or an empty string.
    pub fn active_codes(&self) -> String {
        let mut params: Vec<&str> = ATTRIBUTES
            .iter()
            .filter(|(bit, _)| self.attrs & bit != 0)
            .map(|(_, param)| *param)
            .collect();
        if let Some(fg) = &self.fg {
            params.push(fg);
        }
        if let Some(bg) = &self.bg {
            params.push(bg);
        }
        if params.is_empty() {
            String::new()
        } else {
            format!("\x1b[{}m", params.join(";"))
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
