//! Typed terminal output commands and a single output gate.
//!
//! Invariant: the runtime writes to the terminal only through `OutputGate::flush(..)`.

use crate::core::terminal::Terminal;

pub const SYNC_BEGIN: &str = "\x1b[?2026h";
pub const SYNC_END: &str = "\x1b[?2026l";
/// Clear scrollback, clear screen, home.
pub const CLEAR_ALL: &str = "\x1b[3J\x1b[2J\x1b[H";
pub const ERASE_LINE: &str = "\x1b[2K";
pub const ERASE_DOWN: &str = "\x1b[J";
/// Appended to every written line: closes SGR state and any open OSC 8 hyperlink.
pub const SEGMENT_RESET: &str = "\x1b[0m\x1b]8;;\x07";

pub const HIDE_CURSOR: &str = "\x1b[?25l";
pub const SHOW_CURSOR: &str = "\x1b[?25h";

pub const BRACKETED_PASTE_ENABLE: &str = "\x1b[?2004h";
pub const BRACKETED_PASTE_DISABLE: &str = "\x1b[?2004l";
pub const PASTE_START: &str = "\x1b[200~";
pub const PASTE_END: &str = "\x1b[201~";

pub const KITTY_QUERY: &str = "\x1b[?u";
/// Push flags 1 | 2 | 4: disambiguate, report event types, report alternate keys.
pub const KITTY_PUSH: &str = "\x1b[>7u";
pub const KITTY_POP: &str = "\x1b[<u";

pub const APPEARANCE_SUBSCRIBE: &str = "\x1b[?2031h";
pub const APPEARANCE_UNSUBSCRIBE: &str = "\x1b[?2031l";
pub const APPEARANCE_QUERY: &str = "\x1b[?996n";

pub const DEVICE_ATTRIBUTES_QUERY: &str = "\x1b[c";
/// XTSMGRAPHICS: read the sixel color register count.
pub const GRAPHICS_ATTRIBUTES_QUERY: &str = "\x1b[?2;1;0S";
pub const CELL_SIZE_QUERY: &str = "\x1b[16t";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCmd {
    /// Raw bytes/control sequences (UTF-8 string) to be written to the terminal.
    Bytes(String),

    HideCursor,
    ShowCursor,

    BracketedPasteEnable,
    BracketedPasteDisable,
    KittyQuery,
    KittyPush,
    KittyPop,
    AppearanceSubscribe,
    AppearanceUnsubscribe,
    AppearanceQuery,

    /// Sixel dual probe: primary device attributes plus graphics attributes.
    SixelProbe,
    QueryCellSize,

    SetTitle(String),
}

impl TerminalCmd {
    pub fn bytes(data: impl Into<String>) -> Self {
        Self::Bytes(data.into())
    }

    /// Appends the escape text for this command to `out`.
    pub fn encode_into(&self, out: &mut String) {
        match self {
            Self::Bytes(data) => out.push_str(data),
            Self::HideCursor => out.push_str(HIDE_CURSOR),
            Self::ShowCursor => out.push_str(SHOW_CURSOR),
            Self::BracketedPasteEnable => out.push_str(BRACKETED_PASTE_ENABLE),
            Self::BracketedPasteDisable => out.push_str(BRACKETED_PASTE_DISABLE),
            Self::KittyQuery => out.push_str(KITTY_QUERY),
            Self::KittyPush => out.push_str(KITTY_PUSH),
            Self::KittyPop => out.push_str(KITTY_POP),
            Self::AppearanceSubscribe => out.push_str(APPEARANCE_SUBSCRIBE),
            Self::AppearanceUnsubscribe => out.push_str(APPEARANCE_UNSUBSCRIBE),
            Self::AppearanceQuery => out.push_str(APPEARANCE_QUERY),
            Self::SixelProbe => {
                out.push_str(DEVICE_ATTRIBUTES_QUERY);
                out.push_str(GRAPHICS_ATTRIBUTES_QUERY);
            }
            Self::QueryCellSize => out.push_str(CELL_SIZE_QUERY),
            Self::SetTitle(title) => {
                out.push_str("\x1b]0;");
                out.extend(title.chars().filter(|ch| !ch.is_control()));
                out.push('\x07');
            }
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }
}

/// Concatenates commands into one write.
pub fn encode_all<'a, I>(cmds: I) -> String
where
    I: IntoIterator<Item = &'a TerminalCmd>,
{
    let mut out = String::new();
    for cmd in cmds {
        cmd.encode_into(&mut out);
    }
    out
}

#[derive(Debug, Default)]
pub struct OutputGate {
    cmds: Vec<TerminalCmd>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: TerminalCmd) {
        self.cmds.push(cmd);
    }

    pub fn extend<I>(&mut self, cmds: I)
    where
        I: IntoIterator<Item = TerminalCmd>,
    {
        self.cmds.extend(cmds);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Writes every buffered command as a single terminal write.
    pub fn flush<T: Terminal + ?Sized>(&mut self, term: &mut T) {
        if self.cmds.is_empty() {
            return;
        }
        let data = encode_all(self.cmds.iter());
        self.cmds.clear();
        if !data.is_empty() {
            term.write(&data);
        }
    }
}
