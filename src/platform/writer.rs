//! Terminal output file descriptor writes.
//!
//! The first failed write marks the writer dead; from then on every write is dropped. A closed
//! pty or broken pipe must never take the process down.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::warn;

#[cfg(unix)]
use libc::c_int;

use super::lock;

#[cfg(unix)]
fn wait_writable(fd: c_int) -> std::io::Result<()> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut fds, 1, -1) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if result == 0 {
            continue;
        }
        if (fds.revents & libc::POLLOUT) != 0 {
            return Ok(());
        }
        return Err(std::io::Error::other(format!(
            "terminal not writable (revents=0x{:x})",
            fds.revents
        )));
    }
}

/// Writes all of `bytes`, retrying on EINTR and waiting out EAGAIN.
#[cfg(unix)]
pub(crate) fn write_all_fd_with<FWrite, FWait>(
    fd: c_int,
    bytes: &[u8],
    mut write_once: FWrite,
    mut wait_writable: FWait,
) -> std::io::Result<()>
where
    FWrite: FnMut(c_int, &[u8]) -> std::io::Result<usize>,
    FWait: FnMut(c_int) -> std::io::Result<()>,
{
    let mut written = 0;
    while written < bytes.len() {
        match write_once(fd, &bytes[written..]) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "terminal write returned 0",
                ));
            }
            Ok(count) if count > bytes.len() - written => {
                return Err(std::io::Error::other(
                    "terminal write reported more bytes than requested",
                ));
            }
            Ok(count) => written += count,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => wait_writable(fd)?,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_fd(fd: c_int, bytes: &[u8]) -> std::io::Result<()> {
    write_all_fd_with(
        fd,
        bytes,
        |fd, buf| {
            let result = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
            if result < 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(result as usize)
            }
        },
        wait_writable,
    )
}

#[derive(Debug, Default)]
struct WriteLog {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl WriteLog {
    fn append(&mut self, data: &str) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if self.file.is_none() {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => self.file = Some(file),
                Err(err) => {
                    warn!(path = %path.display(), %err, "disabling terminal write log");
                    self.path = None;
                    return;
                }
            }
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = file.write_all(data.as_bytes()) {
                warn!(%err, "disabling terminal write log");
                self.path = None;
                self.file = None;
            }
        }
    }
}

/// Shared by the runtime's writes and the input thread's protocol replies.
#[derive(Debug)]
pub struct TerminalWriter {
    #[cfg(unix)]
    fd: c_int,
    dead: AtomicBool,
    log: Mutex<WriteLog>,
}

impl TerminalWriter {
    #[cfg(unix)]
    pub fn new(fd: c_int, write_log: Option<PathBuf>) -> Self {
        Self {
            fd,
            dead: AtomicBool::new(false),
            log: Mutex::new(WriteLog {
                path: write_log,
                file: None,
            }),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn write(&self, data: &str) {
        if data.is_empty() || self.is_dead() {
            return;
        }
        // Hold the log lock across the fd write so concurrent writers never interleave.
        let mut log = lock(&self.log);
        if let Err(err) = self.write_raw(data.as_bytes()) {
            warn!(%err, "terminal write failed, dropping all further output");
            self.dead.store(true, Ordering::SeqCst);
            return;
        }
        log.append(data);
    }

    #[cfg(unix)]
    fn write_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        write_fd(self.fd, bytes)
    }

    #[cfg(not(unix))]
    fn write_raw(&self, _bytes: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }
}
