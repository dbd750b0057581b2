#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use tape_term::core::terminal::{CapabilityListener, InputHandler, ResizeHandler};
use tape_term::{CapabilityEvent, Terminal};

/// State shared between a [`FakeTerminal`] owned by the runtime and the test observing it.
#[derive(Default)]
pub struct FakeState {
    pub output: RefCell<String>,
    pub columns: Cell<u16>,
    pub rows: Cell<u16>,
    pub started: Cell<bool>,
    pub stops: Cell<usize>,
    on_input: RefCell<Option<InputHandler>>,
    on_resize: RefCell<Option<ResizeHandler>>,
    listener: RefCell<Option<CapabilityListener>>,
}

impl FakeState {
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Delivers bytes the way the input thread would.
    pub fn send(&self, data: &str) {
        if let Some(handler) = self.on_input.borrow_mut().as_mut() {
            handler(data.to_string());
        }
    }

    pub fn resize(&self, columns: u16, rows: u16) {
        self.columns.set(columns);
        self.rows.set(rows);
        if let Some(handler) = self.on_resize.borrow_mut().as_mut() {
            handler();
        }
    }

    pub fn emit(&self, event: CapabilityEvent) {
        if let Some(listener) = self.listener.borrow_mut().as_mut() {
            listener(event);
        }
    }
}

pub struct FakeTerminal {
    state: Rc<FakeState>,
}

impl FakeTerminal {
    pub fn new(columns: u16, rows: u16) -> (Self, Rc<FakeState>) {
        let state = Rc::new(FakeState::default());
        state.columns.set(columns);
        state.rows.set(rows);
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

impl Terminal for FakeTerminal {
    fn start(&mut self, on_input: InputHandler, on_resize: ResizeHandler) -> io::Result<()> {
        self.state.started.set(true);
        *self.state.on_input.borrow_mut() = Some(on_input);
        *self.state.on_resize.borrow_mut() = Some(on_resize);
        Ok(())
    }

    fn stop(&mut self) -> io::Result<()> {
        self.state.started.set(false);
        self.state.stops.set(self.state.stops.get() + 1);
        Ok(())
    }

    fn drain_input(&mut self, _max_ms: u64, _idle_ms: u64) {}

    fn write(&mut self, data: &str) {
        self.state.output.borrow_mut().push_str(data);
    }

    fn columns(&self) -> u16 {
        self.state.columns.get()
    }

    fn rows(&self) -> u16 {
        self.state.rows.get()
    }

    fn set_capability_listener(&mut self, listener: CapabilityListener) {
        *self.state.listener.borrow_mut() = Some(listener);
    }
}

/// Minimal cell grid that interprets the sequences the renderer emits.
///
/// Printable text uses deferred wrap like xterm. Cursor motion covers CUU, CUD, CHA, CUP home,
/// EL 2 and ED 0/2/3. SGR, private modes, OSC and APC strings are consumed and ignored.
pub struct Screen {
    width: usize,
    height: usize,
    cells: Vec<Vec<char>>,
    row: usize,
    col: usize,
    pending_wrap: bool,
    pub scrollback: Vec<String>,
}

impl Screen {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![vec![' '; width]; height],
            row: 0,
            col: 0,
            pending_wrap: false,
            scrollback: Vec::new(),
        }
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Screen rows with trailing blanks trimmed, and trailing empty rows dropped.
    pub fn rows(&self) -> Vec<String> {
        let mut rows: Vec<String> = self
            .cells
            .iter()
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect();
        while rows.last().is_some_and(|row| row.is_empty()) {
            rows.pop();
        }
        rows
    }

    pub fn feed(&mut self, bytes: &str) {
        let mut chars = bytes.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\x1b' => match chars.next() {
                    Some('[') => {
                        let mut params = String::new();
                        let mut last = None;
                        for next in chars.by_ref() {
                            if ('\x40'..='\x7e').contains(&next) {
                                last = Some(next);
                                break;
                            }
                            params.push(next);
                        }
                        if let Some(final_byte) = last {
                            self.csi(&params, final_byte);
                        }
                    }
                    Some(']') | Some('_') | Some('P') => {
                        while let Some(next) = chars.next() {
                            if next == '\x07' {
                                break;
                            }
                            if next == '\x1b' && chars.peek() == Some(&'\\') {
                                chars.next();
                                break;
                            }
                        }
                    }
                    _ => {}
                },
                '\r' => {
                    self.col = 0;
                    self.pending_wrap = false;
                }
                '\n' => self.line_feed(),
                ch if ch.is_control() => {}
                ch => self.print(ch),
            }
        }
    }

    fn print(&mut self, ch: char) {
        if self.pending_wrap {
            self.col = 0;
            self.line_feed();
        }
        self.cells[self.row][self.col] = ch;
        if self.col + 1 == self.width {
            self.pending_wrap = true;
        } else {
            self.col += 1;
        }
    }

    fn line_feed(&mut self) {
        self.pending_wrap = false;
        if self.row + 1 < self.height {
            self.row += 1;
            return;
        }
        let top = self.cells.remove(0);
        self.scrollback
            .push(top.iter().collect::<String>().trim_end().to_string());
        self.cells.push(vec![' '; self.width]);
    }

    fn csi(&mut self, params: &str, final_byte: char) {
        if params.starts_with('?') || params.starts_with('>') || params.starts_with('<') {
            return;
        }
        let n = params.parse::<usize>().ok();
        let count = n.unwrap_or(1).max(1);
        match final_byte {
            'A' => {
                self.row = self.row.saturating_sub(count);
                self.pending_wrap = false;
            }
            'B' => {
                self.row = (self.row + count).min(self.height - 1);
                self.pending_wrap = false;
            }
            'G' => {
                self.col = (count - 1).min(self.width - 1);
                self.pending_wrap = false;
            }
            'H' => {
                self.row = 0;
                self.col = 0;
                self.pending_wrap = false;
            }
            'K' if n == Some(2) => self.cells[self.row].fill(' '),
            'J' => match n.unwrap_or(0) {
                0 => {
                    self.cells[self.row][self.col..].fill(' ');
                    for row in self.cells.iter_mut().skip(self.row + 1) {
                        row.fill(' ');
                    }
                }
                2 => {
                    for row in self.cells.iter_mut() {
                        row.fill(' ');
                    }
                }
                3 => self.scrollback.clear(),
                _ => {}
            },
            _ => {}
        }
    }
}

pub fn lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}
