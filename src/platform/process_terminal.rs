//! Terminal backed by the process's own stdin/stdout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::EnvConfig;
use crate::core::output::{encode_all, TerminalCmd};
use crate::core::terminal::{CapabilityListener, InputHandler, ResizeHandler, Terminal};
use crate::negotiate::{NegotiatedCapabilities, Negotiator, NegotiatorOptions, TerminalInfo};

use super::lock;
use super::pipeline::{InputPipeline, PipelineOutput};
use super::stdin_buffer::StdinBuffer;
use super::writer::TerminalWriter;

#[cfg(unix)]
use libc::{self, c_int};
#[cfg(unix)]
use signal_hook::iterator::Signals;

/// Upper bound on one poll so stop requests are noticed promptly.
const MAX_POLL_MS: u64 = 50;

#[derive(Default)]
struct Handlers {
    input: Option<InputHandler>,
    capability: Option<CapabilityListener>,
}

fn elapsed_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

#[cfg(unix)]
fn read_winsize(fd: c_int) -> Option<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if result == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some((size.ws_col, size.ws_row))
    } else {
        None
    }
}

#[cfg(unix)]
pub(crate) fn poll_readable(fd: c_int, timeout_ms: i32) -> bool {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let result = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    result > 0 && (fds.revents & libc::POLLIN) != 0
}

#[cfg(unix)]
fn get_termios(fd: c_int) -> std::io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(termios)
}

#[cfg(unix)]
fn set_termios(fd: c_int, termios: &libc::termios) -> std::io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Poll timeout until the pipeline's next deadline, rounded up so the deadline has passed
/// when poll returns.
fn poll_timeout_ms(deadline: Option<Instant>, now: Instant) -> i32 {
    let Some(deadline) = deadline else {
        return MAX_POLL_MS as i32;
    };
    let remaining = deadline.saturating_duration_since(now);
    let mut ms = remaining.as_millis() as u64;
    if remaining > Duration::from_millis(ms) {
        ms += 1;
    }
    ms.min(MAX_POLL_MS) as i32
}

#[cfg(test)]
struct StopTestHooks {
    before_flush_ready: std::sync::mpsc::Sender<()>,
    before_flush_go: std::sync::mpsc::Receiver<()>,
    after_flush_ready: std::sync::mpsc::Sender<()>,
    after_flush_go: std::sync::mpsc::Receiver<()>,
}

#[cfg(test)]
impl StopTestHooks {
    fn before_flush(&self) {
        let _ = self.before_flush_ready.send(());
        let _ = self.before_flush_go.recv();
    }

    fn after_flush(&self) {
        let _ = self.after_flush_ready.send(());
        let _ = self.after_flush_go.recv();
    }
}

/// State shared with the input thread.
struct InputShared {
    pipeline: Mutex<InputPipeline>,
    handlers: Mutex<Handlers>,
    writer: Arc<TerminalWriter>,
    stop: AtomicBool,
    drain_mode: AtomicBool,
    epoch: Instant,
    last_input_ms: AtomicU64,
}

impl InputShared {
    /// Routes one pipeline step. While draining, input and negotiated writes are dropped;
    /// capability events are still reported.
    fn dispatch(&self, out: PipelineOutput) {
        let draining = self.drain_mode.load(Ordering::SeqCst);
        if !draining && !out.cmds.is_empty() {
            self.writer.write(&encode_all(&out.cmds));
        }
        if out.inputs.is_empty() && out.events.is_empty() {
            return;
        }
        let mut handlers = lock(&self.handlers);
        if !draining {
            if let Some(handler) = handlers.input.as_mut() {
                for input in out.inputs {
                    handler(input);
                }
            }
        }
        if let Some(listener) = handlers.capability.as_mut() {
            for event in out.events {
                listener(event);
            }
        }
    }
}

#[cfg(unix)]
pub struct ProcessTerminal {
    stdin_fd: c_int,
    stdout_fd: c_int,
    original_termios: Option<libc::termios>,
    shared: Arc<InputShared>,
    resize_handler: Arc<Mutex<Option<ResizeHandler>>>,
    input_thread: Option<JoinHandle<()>>,
    resize_signal_handle: Option<signal_hook::iterator::Handle>,
    resize_thread: Option<JoinHandle<()>>,
    started: bool,
    #[cfg(test)]
    stop_test_hooks: Option<StopTestHooks>,
}

#[cfg(unix)]
impl ProcessTerminal {
    /// Stdin/stdout with identity and write log taken from the environment.
    pub fn new() -> Self {
        Self::with_fds(
            libc::STDIN_FILENO,
            libc::STDOUT_FILENO,
            TerminalInfo::from_process_env(),
            EnvConfig::from_env().write_log,
        )
    }

    pub fn with_fds(
        stdin_fd: c_int,
        stdout_fd: c_int,
        info: TerminalInfo,
        write_log: Option<PathBuf>,
    ) -> Self {
        let negotiator = Negotiator::new(info, NegotiatorOptions::default());
        let pipeline =
            InputPipeline::new(StdinBuffer::new(StdinBuffer::DEFAULT_TIMEOUT), negotiator);
        let epoch = Instant::now();
        Self {
            stdin_fd,
            stdout_fd,
            original_termios: None,
            shared: Arc::new(InputShared {
                pipeline: Mutex::new(pipeline),
                handlers: Mutex::new(Handlers::default()),
                writer: Arc::new(TerminalWriter::new(stdout_fd, write_log)),
                stop: AtomicBool::new(false),
                drain_mode: AtomicBool::new(false),
                epoch,
                last_input_ms: AtomicU64::new(0),
            }),
            resize_handler: Arc::new(Mutex::new(None)),
            input_thread: None,
            resize_signal_handle: None,
            resize_thread: None,
            started: false,
            #[cfg(test)]
            stop_test_hooks: None,
        }
    }

    pub fn info(&self) -> TerminalInfo {
        *lock(&self.shared.pipeline).negotiator().info()
    }

    fn enable_raw_mode(&mut self) -> std::io::Result<libc::termios> {
        let original = match self.original_termios {
            Some(original) => original,
            None => {
                let original = get_termios(self.stdin_fd)?;
                self.original_termios = Some(original);
                original
            }
        };
        let mut raw = original;
        unsafe {
            libc::cfmakeraw(&mut raw);
        }
        set_termios(self.stdin_fd, &raw)?;
        Ok(original)
    }

    fn restore_raw_mode(&mut self) -> std::io::Result<()> {
        if let Some(original) = self.original_termios.as_ref() {
            set_termios(self.stdin_fd, original)?;
        }
        Ok(())
    }

    fn start_input_thread(&mut self) -> std::io::Result<()> {
        let stdin_fd = self.stdin_fd;
        let shared = Arc::clone(&self.shared);

        let thread = thread::Builder::new()
            .name("tape-input".into())
            .spawn(move || {
                let mut buffer = [0u8; 4096];
                while !shared.stop.load(Ordering::SeqCst) {
                    let deadline = lock(&shared.pipeline).next_deadline();
                    let timeout_ms = poll_timeout_ms(deadline, Instant::now());
                    let readable = poll_readable(stdin_fd, timeout_ms);

                    let mut out = PipelineOutput::default();
                    if readable {
                        let read_len = unsafe {
                            libc::read(stdin_fd, buffer.as_mut_ptr() as *mut _, buffer.len())
                        };
                        if read_len == 0 {
                            debug!("stdin closed, input thread exiting");
                            break;
                        }
                        if read_len < 0 {
                            let err = std::io::Error::last_os_error();
                            if !matches!(
                                err.kind(),
                                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
                            ) {
                                debug!(%err, "stdin read failed, input thread exiting");
                                break;
                            }
                        } else {
                            shared
                                .last_input_ms
                                .store(elapsed_ms(shared.epoch), Ordering::SeqCst);
                            out = lock(&shared.pipeline)
                                .process(&buffer[..read_len as usize], Instant::now());
                        }
                    }

                    // Deadlines keep expiring while input streams in.
                    let ticked = lock(&shared.pipeline).tick(Instant::now());
                    out.inputs.extend(ticked.inputs);
                    out.cmds.extend(ticked.cmds);
                    out.events.extend(ticked.events);

                    if !out.is_empty() {
                        shared.dispatch(out);
                    }
                }
            })?;
        self.input_thread = Some(thread);
        Ok(())
    }

    fn stop_input_thread(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.input_thread.take() {
            let _ = handle.join();
        }
    }

    fn start_resize_thread(&mut self) -> std::io::Result<()> {
        let mut signals = Signals::new([libc::SIGWINCH])?;
        let handle = signals.handle();
        let resize_handler = Arc::clone(&self.resize_handler);

        let thread = thread::Builder::new()
            .name("tape-resize".into())
            .spawn(move || {
                for _ in signals.forever() {
                    if let Some(handler) = lock(&resize_handler).as_mut() {
                        handler();
                    }
                }
            })?;

        self.resize_signal_handle = Some(handle);
        self.resize_thread = Some(thread);
        Ok(())
    }

    fn stop_resize_thread(&mut self) {
        if let Some(handle) = self.resize_signal_handle.take() {
            handle.close();
        }
        if let Some(thread) = self.resize_thread.take() {
            let _ = thread.join();
        }
    }

    fn clear_handlers(&self) {
        lock(&self.shared.handlers).input = None;
        *lock(&self.resize_handler) = None;
    }

    fn abort_start(&mut self, err: std::io::Error) -> std::io::Error {
        self.stop_input_thread();
        self.stop_resize_thread();
        self.clear_handlers();
        let _ = self.restore_raw_mode();
        super::restore::disarm();
        err
    }
}

#[cfg(unix)]
impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Terminal for ProcessTerminal {
    fn start(&mut self, on_input: InputHandler, on_resize: ResizeHandler) -> std::io::Result<()> {
        if self.started {
            return Ok(());
        }
        lock(&self.shared.handlers).input = Some(on_input);
        *lock(&self.resize_handler) = Some(on_resize);

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.drain_mode.store(false, Ordering::SeqCst);
        self.shared
            .last_input_ms
            .store(elapsed_ms(self.shared.epoch), Ordering::SeqCst);

        let original = match self.enable_raw_mode() {
            Ok(original) => original,
            Err(err) => {
                self.clear_handlers();
                return Err(err);
            }
        };
        super::restore::arm(self.stdin_fd, original);

        let mut cmds = vec![TerminalCmd::BracketedPasteEnable];
        cmds.extend(
            lock(&self.shared.pipeline)
                .negotiator_mut()
                .begin(Instant::now()),
        );
        self.shared.writer.write(&encode_all(&cmds));

        if let Err(err) = self.start_resize_thread() {
            return Err(self.abort_start(err));
        }
        unsafe {
            libc::raise(libc::SIGWINCH);
        }
        if let Err(err) = self.start_input_thread() {
            return Err(self.abort_start(err));
        }

        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        let mut cmds = lock(&self.shared.pipeline).negotiator_mut().shutdown_cmds();
        cmds.push(TerminalCmd::BracketedPasteDisable);
        self.shared.writer.write(&encode_all(&cmds));

        self.stop_input_thread();
        self.stop_resize_thread();
        self.clear_handlers();
        lock(&self.shared.pipeline).clear();

        #[cfg(test)]
        if let Some(hooks) = self.stop_test_hooks.as_ref() {
            hooks.before_flush();
        }

        // Anything still queued belongs to us, not the shell.
        let _ = unsafe { libc::tcflush(self.stdin_fd, libc::TCIFLUSH) };

        #[cfg(test)]
        if let Some(hooks) = self.stop_test_hooks.as_ref() {
            hooks.after_flush();
        }

        let restored = self.restore_raw_mode();
        super::restore::disarm();
        restored
    }

    fn drain_input(&mut self, max_ms: u64, idle_ms: u64) {
        // Popping first stops the terminal from generating new release events.
        let pop = lock(&self.shared.pipeline).negotiator_mut().disable_kitty();
        if let Some(cmd) = pop {
            self.shared.writer.write(&cmd.encode());
        }

        let shared = &self.shared;
        shared.drain_mode.store(true, Ordering::SeqCst);
        shared
            .last_input_ms
            .store(elapsed_ms(shared.epoch), Ordering::SeqCst);

        let end = elapsed_ms(shared.epoch).saturating_add(max_ms);
        loop {
            let now = elapsed_ms(shared.epoch);
            if now >= end {
                break;
            }
            let last_input = shared.last_input_ms.load(Ordering::SeqCst);
            if now.saturating_sub(last_input) >= idle_ms {
                break;
            }
            let sleep_for = idle_ms.min(end - now).max(1);
            thread::sleep(Duration::from_millis(sleep_for));
        }

        shared.drain_mode.store(false, Ordering::SeqCst);
    }

    fn write(&mut self, data: &str) {
        self.shared.writer.write(data);
    }

    fn columns(&self) -> u16 {
        read_winsize(self.stdout_fd)
            .map(|(cols, _)| cols)
            .unwrap_or(80)
    }

    fn rows(&self) -> u16 {
        read_winsize(self.stdout_fd)
            .map(|(_, rows)| rows)
            .unwrap_or(24)
    }

    fn set_capability_listener(&mut self, listener: CapabilityListener) {
        lock(&self.shared.handlers).capability = Some(listener);
    }

    fn kitty_protocol_active(&self) -> bool {
        lock(&self.shared.pipeline).negotiator().kitty_active()
    }

    fn negotiated(&self) -> NegotiatedCapabilities {
        lock(&self.shared.pipeline).negotiator().snapshot()
    }

    fn is_dead(&self) -> bool {
        self.shared.writer.is_dead()
    }
}

#[cfg(unix)]
impl Drop for ProcessTerminal {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(not(unix))]
pub struct ProcessTerminal;

#[cfg(not(unix))]
impl ProcessTerminal {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(unix))]
impl Terminal for ProcessTerminal {
    fn start(&mut self, _on_input: InputHandler, _on_resize: ResizeHandler) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "ProcessTerminal requires a Unix platform",
        ))
    }

    fn stop(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn drain_input(&mut self, _max_ms: u64, _idle_ms: u64) {}

    fn write(&mut self, _data: &str) {}

    fn columns(&self) -> u16 {
        80
    }

    fn rows(&self) -> u16 {
        24
    }
}
