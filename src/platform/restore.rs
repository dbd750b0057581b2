//! Emergency terminal restore for panics and fatal signals.
//!
//! `ProcessTerminal::start` arms the restore with the termios it replaced; `stop` disarms it.
//! While armed, `emergency_restore` undoes every mode the adapter may have enabled without
//! consulting any adapter state.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
#[cfg(unix)]
use std::thread;
use std::thread::JoinHandle;

#[cfg(unix)]
use libc::c_int;
#[cfg(unix)]
use signal_hook::iterator::Signals;

/// Everything a crashed session may have left enabled. Each sequence is harmless when the
/// corresponding mode was never turned on.
pub const EMERGENCY_SEQUENCE: &str = concat!(
    "\x1b[?2026l",
    "\x1b[?25h",
    "\x1b[<u",
    "\x1b[?2031l",
    "\x1b[?2004l"
);

static ARMED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
#[derive(Clone, Copy)]
struct SavedTermios {
    fd: c_int,
    termios: libc::termios,
}

#[cfg(unix)]
static SAVED_TERMIOS: Mutex<Option<SavedTermios>> = Mutex::new(None);

#[cfg(unix)]
pub(crate) fn arm(fd: c_int, termios: libc::termios) {
    *super::lock(&SAVED_TERMIOS) = Some(SavedTermios { fd, termios });
    ARMED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) fn disarm() {
    ARMED.store(false, Ordering::SeqCst);
    *super::lock(&SAVED_TERMIOS) = None;
}

pub fn is_armed() -> bool {
    ARMED.load(Ordering::SeqCst)
}

/// Best-effort terminal restore. Runs at most once per arming and never panics.
#[cfg(unix)]
pub fn emergency_restore() {
    if !ARMED.load(Ordering::SeqCst) {
        return;
    }
    restore_with(&TtyWriter::new());
}

#[cfg(unix)]
fn restore_with(writer: &TtyWriter) {
    if !ARMED.swap(false, Ordering::SeqCst) {
        return;
    }
    writer.write_best_effort(EMERGENCY_SEQUENCE);

    // The slot may be held by a thread that is itself panicking; skip rather than deadlock.
    let saved = match SAVED_TERMIOS.try_lock() {
        Ok(mut slot) => slot.take(),
        Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
        Err(std::sync::TryLockError::WouldBlock) => None,
    };
    if let Some(saved) = saved {
        unsafe {
            libc::tcsetattr(saved.fd, libc::TCSANOW, &saved.termios);
        }
    }
}

#[cfg(not(unix))]
pub fn emergency_restore() {
    ARMED.store(false, Ordering::SeqCst);
}

pub struct SignalHookGuard {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_cleanup_once<F>(cleanup: &Arc<F>, ran: &AtomicBool)
where
    F: Fn() + Send + Sync + 'static + ?Sized,
{
    if !ran.swap(true, Ordering::SeqCst) {
        cleanup();
    }
}

/// Runs `cleanup` once on SIGINT, SIGTERM or SIGHUP, then lets the signal take its default
/// effect.
#[cfg(unix)]
pub fn install_signal_handlers<F>(cleanup: F) -> std::io::Result<SignalHookGuard>
where
    F: Fn() + Send + Sync + 'static,
{
    let cleanup = Arc::new(cleanup);
    let ran = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM, libc::SIGHUP])?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("tape-signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                run_cleanup_once(&cleanup, &ran);
                tracing::debug!(signal, "terminal restored after signal");
                let _ = signal_hook::low_level::emulate_default_handler(signal);
            }
        })?;

    Ok(SignalHookGuard {
        handle,
        thread: Some(thread),
    })
}

type PanicHookFn = dyn Fn(&std::panic::PanicHookInfo) + Send + Sync + 'static;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PanicHookId {
    data: usize,
    vtable: usize,
}

fn panic_hook_id(hook: &PanicHookFn) -> PanicHookId {
    // Fat pointer identity: same data pointer and same vtable.
    let raw = hook as *const PanicHookFn;
    let (data, vtable): (*const (), *const ()) = unsafe { std::mem::transmute(raw) };
    PanicHookId {
        data: data as usize,
        vtable: vtable as usize,
    }
}

struct CleanupNode {
    cleanup: Arc<dyn Fn() + Send + Sync + 'static>,
    ran: AtomicBool,
    active: AtomicBool,
    next: AtomicPtr<CleanupNode>,
}

/// Registered panic cleanups. Nodes are leaked; dropping a guard only deactivates its node.
static CLEANUP_HEAD: AtomicPtr<CleanupNode> = AtomicPtr::new(std::ptr::null_mut());
static ACTIVE_GUARDS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct WrapperState {
    installed: Option<PanicHookId>,
    previous: Option<Arc<Box<PanicHookFn>>>,
}

static WRAPPER_STATE: Mutex<WrapperState> = Mutex::new(WrapperState {
    installed: None,
    previous: None,
});

fn register_cleanup(cleanup: Arc<dyn Fn() + Send + Sync + 'static>) -> *mut CleanupNode {
    let node_ptr = Box::into_raw(Box::new(CleanupNode {
        cleanup,
        ran: AtomicBool::new(false),
        active: AtomicBool::new(true),
        next: AtomicPtr::new(std::ptr::null_mut()),
    }));

    loop {
        let head = CLEANUP_HEAD.load(Ordering::Acquire);
        // SAFETY: the node is not published until the compare-exchange succeeds.
        unsafe {
            (*node_ptr).next.store(head, Ordering::Relaxed);
        }
        if CLEANUP_HEAD
            .compare_exchange(head, node_ptr, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return node_ptr;
        }
    }
}

fn run_active_cleanups() {
    let mut node_ptr = CLEANUP_HEAD.load(Ordering::Acquire);
    while !node_ptr.is_null() {
        // SAFETY: nodes live for the rest of the program.
        let node = unsafe { &*node_ptr };
        if node.active.load(Ordering::Acquire) {
            run_cleanup_once(&node.cleanup, &node.ran);
        }
        node_ptr = node.next.load(Ordering::Acquire);
    }
}

/// Installs the wrapper hook iff at least one guard is alive, without removing hooks that
/// were set after ours.
fn sync_wrapper() {
    let mut state = super::lock(&WRAPPER_STATE);

    loop {
        let want_wrapper = ACTIVE_GUARDS.load(Ordering::SeqCst) != 0;
        let current = std::panic::take_hook();
        let current_id = panic_hook_id(current.as_ref());

        match (want_wrapper, state.installed) {
            (true, Some(installed)) if current_id == installed => std::panic::set_hook(current),
            (true, _) => {
                let previous = Arc::new(current);
                let chained = Arc::clone(&previous);
                let hook: Box<PanicHookFn> = Box::new(move |info| {
                    run_active_cleanups();
                    (chained)(info);
                });
                state.installed = Some(panic_hook_id(hook.as_ref()));
                state.previous = Some(previous);
                std::panic::set_hook(hook);
            }
            (false, Some(installed)) if current_id == installed => {
                drop(current);
                state.installed = None;
                if let Some(previous) = state.previous.take() {
                    match Arc::try_unwrap(previous) {
                        Ok(previous) => std::panic::set_hook(previous),
                        Err(previous) => std::panic::set_hook(Box::new(move |info| {
                            (previous)(info);
                        })),
                    }
                }
            }
            (false, Some(_)) => {
                // Someone replaced our wrapper; leave their hook in place.
                std::panic::set_hook(current);
                state.installed = None;
                state.previous = None;
            }
            (false, None) => std::panic::set_hook(current),
        }

        let want_now = ACTIVE_GUARDS.load(Ordering::SeqCst) != 0;
        if want_now == state.installed.is_some() {
            break;
        }
    }
}

pub struct PanicHookGuard {
    node: *mut CleanupNode,
}

// SAFETY: the node is leaked and only touched through atomics.
unsafe impl Send for PanicHookGuard {}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        // SAFETY: nodes live for the rest of the program.
        unsafe {
            (*self.node).active.store(false, Ordering::Release);
        }
        if ACTIVE_GUARDS.fetch_sub(1, Ordering::SeqCst) == 1 {
            sync_wrapper();
        }
    }
}

/// Runs `cleanup` once on the first panic, before the previously installed hook.
pub fn install_panic_hook<F>(cleanup: F) -> PanicHookGuard
where
    F: Fn() + Send + Sync + 'static,
{
    let node = register_cleanup(Arc::new(cleanup));
    if ACTIVE_GUARDS.fetch_add(1, Ordering::SeqCst) == 0 {
        sync_wrapper();
    }
    PanicHookGuard { node }
}

/// Writer for the crash path: opens the controlling tty non-blocking and drops whatever does
/// not fit.
#[cfg(unix)]
pub(crate) struct TtyWriter {
    fd: c_int,
    owns_fd: bool,
}

#[cfg(unix)]
impl TtyWriter {
    pub(crate) fn new() -> Self {
        let flags = libc::O_WRONLY | libc::O_NONBLOCK | libc::O_NOCTTY | libc::O_CLOEXEC;
        let fd = unsafe { libc::open(c"/dev/tty".as_ptr(), flags) };
        if fd >= 0 {
            Self { fd, owns_fd: true }
        } else {
            // Without a tty, stdout may be a full pipe; write nothing.
            Self {
                fd: -1,
                owns_fd: false,
            }
        }
    }

    pub(crate) fn write_best_effort(&self, data: &str) {
        if self.fd < 0 || data.is_empty() {
            return;
        }
        let bytes = data.as_bytes();
        let mut written = 0;
        while written < bytes.len() {
            let remaining = &bytes[written..];
            let result = unsafe {
                libc::write(
                    self.fd,
                    remaining.as_ptr() as *const libc::c_void,
                    remaining.len(),
                )
            };
            if result > 0 {
                written += result as usize;
                continue;
            }
            if result < 0
                && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted
            {
                continue;
            }
            break;
        }
    }
}

#[cfg(unix)]
impl Drop for TtyWriter {
    fn drop(&mut self) {
        if self.owns_fd {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_lock() -> &'static Mutex<()> {
    static LOCK: Mutex<()> = Mutex::new(());
    &LOCK
}

#[cfg(all(test, unix))]
mod tests {
    use super::{
        arm, disarm, install_panic_hook, is_armed, panic_hook_id, restore_with, test_lock,
        PanicHookFn, TtyWriter, EMERGENCY_SEQUENCE,
    };
    use crate::core::output::{
        APPEARANCE_UNSUBSCRIBE, BRACKETED_PASTE_DISABLE, KITTY_POP, SHOW_CURSOR, SYNC_END,
    };
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RestoreOriginal {
        hook: Option<Box<PanicHookFn>>,
    }

    impl Drop for RestoreOriginal {
        fn drop(&mut self) {
            if let Some(hook) = self.hook.take() {
                std::panic::set_hook(hook);
            }
        }
    }

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        test_lock().lock().unwrap_or_else(|p| p.into_inner())
    }

    #[test]
    fn emergency_sequence_covers_every_enabled_mode() {
        for part in [
            SYNC_END,
            SHOW_CURSOR,
            KITTY_POP,
            APPEARANCE_UNSUBSCRIBE,
            BRACKETED_PASTE_DISABLE,
        ] {
            assert!(EMERGENCY_SEQUENCE.contains(part), "missing {part:?}");
        }
        assert!(EMERGENCY_SEQUENCE.starts_with(SYNC_END));
    }

    #[test]
    fn restore_runs_once_per_arming() {
        let _guard = lock();
        let termios: libc::termios = unsafe { std::mem::zeroed() };

        // Invalid fds keep the test runner's terminal untouched.
        let writer = TtyWriter {
            fd: -1,
            owns_fd: false,
        };
        arm(-1, termios);
        assert!(is_armed());
        restore_with(&writer);
        assert!(!is_armed());
        restore_with(&writer);
        assert!(!is_armed());

        arm(-1, termios);
        disarm();
        assert!(!is_armed());
    }

    #[test]
    fn panic_cleanup_runs_before_previous_hook() {
        let _guard = lock();
        let _restore = RestoreOriginal {
            hook: Some(std::panic::take_hook()),
        };

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        std::panic::set_hook(Box::new({
            let order = Arc::clone(&order);
            move |info: &std::panic::PanicHookInfo| {
                // Other tests may panic concurrently; only count ours.
                if matches!(info.payload().downcast_ref::<&str>(), Some(&"boom" | &"again")) {
                    order.lock().unwrap().push("previous");
                }
            }
        }));

        let guard = install_panic_hook({
            let order = Arc::clone(&order);
            move || order.lock().unwrap().push("cleanup")
        });
        let _ = std::panic::catch_unwind(|| panic!("boom"));
        let _ = std::panic::catch_unwind(|| panic!("again"));
        drop(guard);

        assert_eq!(
            *order.lock().unwrap(),
            vec!["cleanup", "previous", "previous"]
        );
    }

    #[test]
    fn dropping_an_older_guard_keeps_the_newer_cleanup() {
        let _guard = lock();
        let _restore = RestoreOriginal {
            hook: Some(std::panic::take_hook()),
        };
        std::panic::set_hook(Box::new(|_| {}));

        let cleanup_a = Arc::new(AtomicUsize::new(0));
        let cleanup_b = Arc::new(AtomicUsize::new(0));
        let guard_a = install_panic_hook({
            let cleanup_a = Arc::clone(&cleanup_a);
            move || {
                cleanup_a.fetch_add(1, Ordering::SeqCst);
            }
        });
        let guard_b = install_panic_hook({
            let cleanup_b = Arc::clone(&cleanup_b);
            move || {
                cleanup_b.fetch_add(1, Ordering::SeqCst);
            }
        });

        drop(guard_a);
        let _ = std::panic::catch_unwind(|| panic!("boom"));

        assert_eq!(cleanup_a.load(Ordering::SeqCst), 0);
        assert_eq!(cleanup_b.load(Ordering::SeqCst), 1);
        drop(guard_b);
    }

    #[test]
    fn base_hook_is_restored_when_guards_drop_out_of_order() {
        let _guard = lock();
        let _restore = RestoreOriginal {
            hook: Some(std::panic::take_hook()),
        };

        fn base_hook(_: &std::panic::PanicHookInfo) {}
        let base: Box<PanicHookFn> = Box::new(base_hook);
        let base_id = panic_hook_id(base.as_ref());
        std::panic::set_hook(base);

        let guard_a = install_panic_hook(|| {});
        let guard_b = install_panic_hook(|| {});
        drop(guard_a);
        drop(guard_b);

        let current = std::panic::take_hook();
        let current_id = panic_hook_id(current.as_ref());
        std::panic::set_hook(current);
        assert_eq!(current_id, base_id);
    }

    #[test]
    fn tty_writer_gives_up_on_a_full_pipe() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        unsafe {
            let flags = libc::fcntl(write_fd, libc::F_GETFL);
            libc::fcntl(write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        let buf = [b'x'; 4096];
        loop {
            let written =
                unsafe { libc::write(write_fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
            if written > 0 {
                continue;
            }
            let err = io::Error::last_os_error();
            if written < 0 && err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break;
        }

        let writer = TtyWriter {
            fd: write_fd,
            owns_fd: false,
        };
        writer.write_best_effort(EMERGENCY_SEQUENCE);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
