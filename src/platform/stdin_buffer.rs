//! Stdin chunk reassembly.
//!
//! Reads from a raw-mode terminal arrive in arbitrary pieces. The buffer emits one event per
//! complete key sequence, holds an unfinished escape sequence until it completes or its flush
//! deadline passes, and collects bracketed pastes (which may span many reads) into one event.

use std::time::{Duration, Instant};

use crate::core::output::{PASTE_END, PASTE_START};

const ESC: u8 = 0x1b;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinEvent {
    Data(String),
    /// Paste payload without its bracket markers.
    Paste(String),
}

#[derive(Debug, PartialEq, Eq)]
enum SequenceStatus {
    Complete,
    Incomplete,
}

pub struct StdinBuffer {
    buffer: String,
    timeout: Duration,
    paste: Option<String>,
    flush_deadline: Option<Instant>,
}

impl StdinBuffer {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10);

    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: String::new(),
            timeout,
            paste: None,
            flush_deadline: None,
        }
    }

    pub fn process(&mut self, data: &[u8], now: Instant) -> Vec<StdinEvent> {
        self.flush_deadline = None;

        // A lone high-bit byte is the legacy meta encoding of ESC + (byte - 128).
        let text = if data.len() == 1 && data[0] > 127 {
            let mut converted = String::from("\x1b");
            converted.push(char::from(data[0] - 128));
            converted
        } else {
            String::from_utf8_lossy(data).into_owned()
        };

        let mut events = Vec::new();
        self.push_str(&text, &mut events);
        if !self.buffer.is_empty() {
            self.flush_deadline = Some(now + self.timeout);
        }
        events
    }

    /// Emits a held incomplete sequence verbatim once its deadline has passed.
    pub fn flush_due(&mut self, now: Instant) -> Vec<StdinEvent> {
        match self.flush_deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => Vec::new(),
        }
    }

    pub fn flush(&mut self) -> Vec<StdinEvent> {
        self.flush_deadline = None;
        if self.buffer.is_empty() {
            return Vec::new();
        }
        vec![StdinEvent::Data(std::mem::take(&mut self.buffer))]
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }

    pub fn clear(&mut self) {
        self.flush_deadline = None;
        self.buffer.clear();
        self.paste = None;
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn in_paste(&self) -> bool {
        self.paste.is_some()
    }

    fn push_str(&mut self, data: &str, events: &mut Vec<StdinEvent>) {
        if let Some(paste) = self.paste.as_mut() {
            paste.push_str(data);
            self.finish_paste(events);
            return;
        }

        self.buffer.push_str(data);
        if let Some(start) = self.buffer.find(PASTE_START) {
            let rest = self.buffer.split_off(start);
            let before = std::mem::take(&mut self.buffer);
            // Whatever precedes the paste is flushed as-is, even if it looked incomplete.
            let (sequences, remainder) = split_sequences(&before);
            events.extend(sequences.into_iter().map(StdinEvent::Data));
            if !remainder.is_empty() {
                events.push(StdinEvent::Data(remainder.to_string()));
            }
            self.paste = Some(rest[PASTE_START.len()..].to_string());
            self.finish_paste(events);
            return;
        }

        let (sequences, remainder) = split_sequences(&self.buffer);
        let remainder = remainder.to_string();
        events.extend(sequences.into_iter().map(StdinEvent::Data));
        self.buffer = remainder;
    }

    fn finish_paste(&mut self, events: &mut Vec<StdinEvent>) {
        let Some(paste) = self.paste.as_ref() else {
            return;
        };
        let Some(end) = paste.find(PASTE_END) else {
            return;
        };
        let content = paste[..end].to_string();
        let remaining = paste[end + PASTE_END.len()..].to_string();
        self.paste = None;
        events.push(StdinEvent::Paste(content));
        if !remaining.is_empty() {
            self.push_str(&remaining, events);
        }
    }
}

/// Splits into complete sequences (single characters for plain text) and an incomplete
/// escape tail. Bytes are never dropped or reordered; a malformed tail blocks what follows
/// until the flush deadline.
fn split_sequences(buffer: &str) -> (Vec<String>, &str) {
    let mut sequences = Vec::new();
    let mut pos = 0;
    while pos < buffer.len() {
        if buffer.as_bytes()[pos] != ESC {
            let ch_len = buffer[pos..].chars().next().map_or(1, char::len_utf8);
            sequences.push(buffer[pos..pos + ch_len].to_string());
            pos += ch_len;
            continue;
        }

        let Some(len) = complete_sequence_len(&buffer[pos..]) else {
            return (sequences, &buffer[pos..]);
        };
        sequences.push(buffer[pos..pos + len].to_string());
        pos += len;
    }
    (sequences, "")
}

/// Length of the complete sequence at the start of `data` (which begins with ESC).
fn complete_sequence_len(data: &str) -> Option<usize> {
    let mut end = 1;
    loop {
        if end > data.len() {
            return None;
        }
        if data.is_char_boundary(end) && sequence_status(&data[..end]) == SequenceStatus::Complete {
            return Some(end);
        }
        end += 1;
    }
}

fn sequence_status(data: &str) -> SequenceStatus {
    use SequenceStatus::{Complete, Incomplete};

    let bytes = data.as_bytes();
    let Some(&introducer) = bytes.get(1) else {
        return Incomplete;
    };
    match introducer {
        // Legacy X10 mouse: CSI M plus three raw bytes.
        b'[' if bytes.get(2) == Some(&b'M') => {
            if bytes.len() >= 6 {
                Complete
            } else {
                Incomplete
            }
        }
        b'[' => csi_status(&data[2..]),
        b']' => terminated(data, true),
        b'P' | b'_' => terminated(data, false),
        b'O' => {
            if bytes.len() >= 3 {
                Complete
            } else {
                Incomplete
            }
        }
        // Alt+key: ESC followed by one character.
        _ => Complete,
    }
}

fn csi_status(payload: &str) -> SequenceStatus {
    let Some(&last) = payload.as_bytes().last() else {
        return SequenceStatus::Incomplete;
    };
    if !(0x40..=0x7e).contains(&last) {
        return SequenceStatus::Incomplete;
    }
    // SGR mouse reports must carry three numeric fields before M/m.
    if let Some(inner) = payload.strip_prefix('<') {
        let fields = &inner[..inner.len() - 1];
        let parts: Vec<&str> = fields.split(';').collect();
        let valid = (last == b'M' || last == b'm')
            && parts.len() == 3
            && parts
                .iter()
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
        return if valid {
            SequenceStatus::Complete
        } else {
            SequenceStatus::Incomplete
        };
    }
    SequenceStatus::Complete
}

fn terminated(data: &str, allow_bel: bool) -> SequenceStatus {
    if data.len() > 2 && (data.ends_with("\x1b\\") || (allow_bel && data.ends_with('\x07'))) {
        SequenceStatus::Complete
    } else {
        SequenceStatus::Incomplete
    }
}
