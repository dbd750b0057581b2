//! Key event classification for the Kitty keyboard protocol.
//!
//! With event-type reporting pushed, a key sequence carries `:<type>` after its modifier field,
//! e.g. `CSI 97;1:3u` for releasing `a`. Type 2 is a repeat, 3 a release.

use crate::core::output::PASTE_START;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    Press,
    Repeat,
    Release,
}

/// Finals that can carry an event type: `u` keys, `~` functional keys, arrows, home, end.
const EVENT_FINALS: &[u8] = b"u~ABCDHF";

/// Event type of a single CSI key sequence, `Press` for anything unrecognized.
pub fn key_event_type(data: &str) -> KeyEventType {
    if data.contains(PASTE_START) {
        return KeyEventType::Press;
    }
    let Some(body) = data.strip_prefix("\x1b[") else {
        return KeyEventType::Press;
    };
    let Some(&final_byte) = body.as_bytes().last() else {
        return KeyEventType::Press;
    };
    if !EVENT_FINALS.contains(&final_byte) {
        return KeyEventType::Press;
    }

    let params = &body[..body.len() - 1];
    // The event type lives in the second field: `code;mods:type[;text]`.
    let event = params
        .split(';')
        .nth(1)
        .and_then(|mods| mods.split(':').nth(1));
    match event {
        Some("2") => KeyEventType::Repeat,
        Some("3") => KeyEventType::Release,
        _ => KeyEventType::Press,
    }
}

pub fn is_key_release(data: &str) -> bool {
    key_event_type(data) == KeyEventType::Release
}

pub fn is_key_repeat(data: &str) -> bool {
    key_event_type(data) == KeyEventType::Repeat
}
