//! Terminal identity from environment markers.

use std::collections::HashMap;
use std::env;

use crate::core::image::ImageProtocol;

/// Forces a specific identity (`kitty`, `ghostty`, `wezterm`, `iterm2`, ...).
pub const TERMINAL_OVERRIDE_VAR: &str = "TAPE_TERMINAL";
/// Forces the image protocol (`kitty`, `iterm2`, `sixel`, or `none`).
pub const IMAGE_PROTOCOL_OVERRIDE_VAR: &str = "TAPE_IMAGE_PROTOCOL";

const DETECTION_VARS: &[&str] = &[
    TERMINAL_OVERRIDE_VAR,
    IMAGE_PROTOCOL_OVERRIDE_VAR,
    "TERM",
    "TERM_PROGRAM",
    "COLORTERM",
    "KITTY_WINDOW_ID",
    "GHOSTTY_RESOURCES_DIR",
    "WEZTERM_PANE",
    "ITERM_SESSION_ID",
    "ALACRITTY_WINDOW_ID",
    "KONSOLE_VERSION",
    "WT_SESSION",
    "TMUX",
    "STY",
];

/// The environment variables identity detection reads, captured once.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        let vars = DETECTION_VARS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { vars }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn lower(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalIdentity {
    Kitty,
    Ghostty,
    WezTerm,
    Iterm2,
    VsCode,
    Alacritty,
    Konsole,
    WindowsTerminal,
    AppleTerminal,
    Tmux,
    Screen,
    Unknown,
}

impl TerminalIdentity {
    fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "kitty" => Self::Kitty,
            "ghostty" => Self::Ghostty,
            "wezterm" => Self::WezTerm,
            "iterm2" | "iterm" | "iterm.app" => Self::Iterm2,
            "vscode" => Self::VsCode,
            "alacritty" => Self::Alacritty,
            "konsole" => Self::Konsole,
            "windows-terminal" | "windowsterminal" => Self::WindowsTerminal,
            "apple_terminal" | "terminal.app" => Self::AppleTerminal,
            "tmux" => Self::Tmux,
            "screen" => Self::Screen,
            "unknown" => Self::Unknown,
            _ => return None,
        })
    }

    /// Detection order matters: a multiplexer running inside kitty still reports kitty markers,
    /// and those win.
    fn detect(env: &EnvSnapshot) -> Self {
        if let Some(forced) = env.get(TERMINAL_OVERRIDE_VAR).and_then(Self::parse) {
            return forced;
        }
        let program = env.lower("TERM_PROGRAM");
        let term = env.lower("TERM");

        if env.has("KITTY_WINDOW_ID") || program == "kitty" || term == "xterm-kitty" {
            Self::Kitty
        } else if program == "ghostty"
            || term.contains("ghostty")
            || env.has("GHOSTTY_RESOURCES_DIR")
        {
            Self::Ghostty
        } else if env.has("WEZTERM_PANE") || program == "wezterm" {
            Self::WezTerm
        } else if env.has("ITERM_SESSION_ID") || program == "iterm.app" {
            Self::Iterm2
        } else if program == "vscode" {
            Self::VsCode
        } else if env.has("ALACRITTY_WINDOW_ID") || program == "alacritty" || term == "alacritty" {
            Self::Alacritty
        } else if env.has("KONSOLE_VERSION") {
            Self::Konsole
        } else if env.has("WT_SESSION") {
            Self::WindowsTerminal
        } else if program == "apple_terminal" {
            Self::AppleTerminal
        } else if env.has("TMUX") || term.starts_with("tmux") || program == "tmux" {
            Self::Tmux
        } else if env.has("STY") || term.starts_with("screen") {
            Self::Screen
        } else {
            Self::Unknown
        }
    }

    fn image_protocol(self) -> Option<ImageProtocol> {
        match self {
            Self::Kitty | Self::Ghostty | Self::WezTerm => Some(ImageProtocol::Kitty),
            Self::Iterm2 => Some(ImageProtocol::Iterm2),
            _ => None,
        }
    }

    fn notifications(self) -> NotificationProtocol {
        match self {
            Self::Kitty => NotificationProtocol::Osc99,
            Self::Iterm2 | Self::WezTerm | Self::Ghostty => NotificationProtocol::Osc9,
            Self::Konsole => NotificationProtocol::Osc777,
            _ => NotificationProtocol::Bell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationProtocol {
    Osc99,
    Osc9,
    Osc777,
    Bell,
}

impl NotificationProtocol {
    pub fn encode(self, title: &str, body: &str) -> String {
        let clean = |text: &str| -> String { text.chars().filter(|ch| !ch.is_control()).collect() };
        match self {
            Self::Osc99 => format!("\x1b]99;;{}: {}\x1b\\", clean(title), clean(body)),
            Self::Osc9 => format!("\x1b]9;{}: {}\x07", clean(title), clean(body)),
            Self::Osc777 => format!("\x1b]777;notify;{};{}\x07", clean(title), clean(body)),
            Self::Bell => "\x07".to_string(),
        }
    }
}

/// What the environment says about the terminal. Fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalInfo {
    pub identity: TerminalIdentity,
    pub image_protocol: Option<ImageProtocol>,
    pub true_color: bool,
    pub hyperlinks: bool,
    pub notifications: NotificationProtocol,
    /// Running under tmux or screen, where images may still work through passthrough.
    pub multiplexed: bool,
}

impl TerminalInfo {
    pub fn detect(env: &EnvSnapshot) -> Self {
        let identity = TerminalIdentity::detect(env);
        let term = env.lower("TERM");
        let multiplexed = env.has("TMUX")
            || env.has("STY")
            || term.starts_with("tmux")
            || term.starts_with("screen");

        let image_protocol = match env.get(IMAGE_PROTOCOL_OVERRIDE_VAR) {
            Some(forced) => ImageProtocol::parse(forced),
            None => identity.image_protocol(),
        };

        let color_term = env.lower("COLORTERM");
        let true_color = !matches!(
            identity,
            TerminalIdentity::Unknown
                | TerminalIdentity::Tmux
                | TerminalIdentity::Screen
                | TerminalIdentity::AppleTerminal
        ) || color_term == "truecolor"
            || color_term == "24bit";

        Self {
            identity,
            image_protocol,
            true_color,
            hyperlinks: identity != TerminalIdentity::AppleTerminal,
            notifications: identity.notifications(),
            multiplexed,
        }
    }

    pub fn from_process_env() -> Self {
        Self::detect(&EnvSnapshot::from_process())
    }
}
