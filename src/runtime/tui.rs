//! TUI runtime: render scheduling, input routing and terminal lifecycle.
//!
//! Terminal threads never touch components. Input, resizes and capability events are queued
//! on [`RuntimeWake`] and processed on the thread that owns the runtime, which renders at most
//! once per tick.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::EnvConfig;
use crate::core::component::ComponentRc;
use crate::core::cursor::CursorPos;
use crate::core::image::is_image_line;
use crate::core::input::is_key_release;
use crate::core::output::{OutputGate, TerminalCmd};
use crate::core::terminal::Terminal;
use crate::error::{RenderError, TuiError};
use crate::logging::{write_crash_log, CrashReport};
use crate::negotiate::{Appearance, CapabilityEvent, NegotiatedCapabilities};
use crate::platform::lock;
use crate::render::overlay::{
    composite_overlays, resolve_overlay_position, resolve_overlay_size, OverlayOptions,
    OverlaySize, RenderedOverlay,
};
use crate::render::renderer::{DiffRenderer, RenderOptions};
use crate::runtime::overlay::{OverlayHandle, OverlayStack};

const STOP_DRAIN_MAX_MS: u64 = 1000;
const STOP_DRAIN_IDLE_MS: u64 = 50;
const COALESCE_MAX_DURATION_MS: u64 = 2;
const COALESCE_MAX_ITERATIONS: usize = 8;

type AppearanceCallback = Box<dyn FnMut(Appearance)>;

#[derive(Clone, Copy, Debug)]
struct CoalesceBudget {
    max_duration: Duration,
    max_iterations: usize,
}

impl Default for CoalesceBudget {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_millis(COALESCE_MAX_DURATION_MS),
            max_iterations: COALESCE_MAX_ITERATIONS,
        }
    }
}

impl CoalesceBudget {
    fn allows(&self, start: Instant, iterations: usize) -> bool {
        start.elapsed() < self.max_duration && iterations < self.max_iterations
    }
}

#[derive(Default)]
struct RuntimeWakeState {
    pending_inputs: Vec<String>,
    pending_capabilities: Vec<CapabilityEvent>,
    pending_resize: bool,
    render_requested: bool,
    pending_title: Option<String>,
    stop_requested: bool,
}

impl RuntimeWakeState {
    fn has_event(&self) -> bool {
        self.render_requested || self.has_pending_non_render()
    }

    fn has_pending_non_render(&self) -> bool {
        self.pending_resize
            || !self.pending_inputs.is_empty()
            || !self.pending_capabilities.is_empty()
            || self.pending_title.is_some()
    }
}

/// Work queued for the runtime thread. Every producer funnels into one condvar.
#[derive(Default)]
pub(crate) struct RuntimeWake {
    state: Mutex<RuntimeWakeState>,
    cvar: Condvar,
}

impl RuntimeWake {
    /// Blocks until there is work. Returns false once stop was requested.
    fn wait_for_event(&self) -> bool {
        let mut state = lock(&self.state);
        while !state.stop_requested && !state.has_event() {
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        !state.stop_requested
    }

    fn update(&self, apply: impl FnOnce(&mut RuntimeWakeState)) {
        let mut state = lock(&self.state);
        apply(&mut state);
        self.cvar.notify_one();
    }

    fn enqueue_input(&self, data: String) {
        self.update(|state| state.pending_inputs.push(data));
    }

    fn push_capability(&self, event: CapabilityEvent) {
        self.update(|state| state.pending_capabilities.push(event));
    }

    fn signal_resize(&self) {
        self.update(|state| state.pending_resize = true);
    }

    pub(crate) fn request_render(&self) {
        self.update(|state| state.render_requested = true);
    }

    fn set_title(&self, title: String) {
        self.update(|state| state.pending_title = Some(title));
    }

    fn take_pending_resize(&self) -> bool {
        std::mem::take(&mut lock(&self.state).pending_resize)
    }

    fn take_pending_title(&self) -> Option<String> {
        lock(&self.state).pending_title.take()
    }

    fn drain_inputs(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.state).pending_inputs)
    }

    fn drain_capabilities(&self) -> Vec<CapabilityEvent> {
        std::mem::take(&mut lock(&self.state).pending_capabilities)
    }

    fn take_render_requested(&self) -> bool {
        std::mem::take(&mut lock(&self.state).render_requested)
    }

    fn clear_render_requested(&self) {
        lock(&self.state).render_requested = false;
    }

    fn reset_for_start(&self) {
        *lock(&self.state) = RuntimeWakeState::default();
    }

    fn request_stop(&self) {
        let mut state = lock(&self.state);
        state.stop_requested = true;
        self.cvar.notify_all();
    }
}

/// Cross-thread handle for scheduling renders and title updates.
#[derive(Clone)]
pub struct RenderHandle {
    wake: Arc<RuntimeWake>,
}

impl RenderHandle {
    pub fn request_render(&self) {
        self.wake.request_render();
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.wake.set_title(title.into());
    }
}

pub struct TuiRuntime<T: Terminal> {
    terminal: T,
    output: OutputGate,
    root: ComponentRc,
    renderer: DiffRenderer,
    overlays: Rc<RefCell<OverlayStack>>,
    config: EnvConfig,
    clear_on_shrink: bool,
    show_hardware_cursor: bool,
    stopped: bool,
    wake: Arc<RuntimeWake>,
    coalesce_budget: CoalesceBudget,
    appearance_callbacks: Vec<AppearanceCallback>,
    #[cfg(all(unix, not(test)))]
    signal_hook_guard: Option<crate::platform::SignalHookGuard>,
    #[cfg(all(unix, not(test)))]
    panic_hook_guard: Option<crate::platform::PanicHookGuard>,
}

impl<T: Terminal> TuiRuntime<T> {
    pub fn new(terminal: T, root: ComponentRc) -> Self {
        Self::with_config(terminal, root, EnvConfig::from_env())
    }

    pub fn with_config(terminal: T, root: ComponentRc, config: EnvConfig) -> Self {
        let mut renderer = DiffRenderer::new();
        renderer.set_debug_redraw(config.debug_redraw);
        Self {
            terminal,
            output: OutputGate::new(),
            root,
            renderer,
            overlays: Rc::new(RefCell::new(OverlayStack::new())),
            clear_on_shrink: config.clear_on_shrink,
            show_hardware_cursor: config.hardware_cursor,
            config,
            stopped: true,
            wake: Arc::new(RuntimeWake::default()),
            coalesce_budget: CoalesceBudget::default(),
            appearance_callbacks: Vec::new(),
            #[cfg(all(unix, not(test)))]
            signal_hook_guard: None,
            #[cfg(all(unix, not(test)))]
            panic_hook_guard: None,
        }
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    pub fn render_handle(&self) -> RenderHandle {
        RenderHandle {
            wake: Arc::clone(&self.wake),
        }
    }

    /// Sets the window title. Queued while running, written immediately when stopped.
    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if self.stopped {
            self.output.push(TerminalCmd::SetTitle(title));
            self.flush_output();
        } else {
            self.wake.set_title(title);
        }
    }

    /// What capability probing has established so far.
    pub fn capabilities(&self) -> NegotiatedCapabilities {
        self.terminal.negotiated()
    }

    pub fn kitty_protocol_active(&self) -> bool {
        self.terminal.kitty_protocol_active()
    }

    /// Runs on the runtime thread whenever the terminal reports a theme switch.
    pub fn on_appearance_change(&mut self, callback: impl FnMut(Appearance) + 'static) {
        self.appearance_callbacks.push(Box::new(callback));
    }

    pub fn request_full_redraw(&mut self) {
        self.renderer.request_full_redraw();
        self.request_render();
    }

    pub fn set_show_hardware_cursor(&mut self, enabled: bool) {
        if self.show_hardware_cursor != enabled {
            self.show_hardware_cursor = enabled;
            self.request_render();
        }
    }

    pub fn set_clear_on_shrink(&mut self, enabled: bool) {
        self.clear_on_shrink = enabled;
    }

    pub fn set_focus(&mut self, target: ComponentRc) {
        self.overlays.borrow_mut().set_focus(Some(target));
    }

    pub fn clear_focus(&mut self) {
        self.overlays.borrow_mut().set_focus(None);
    }

    pub fn focused(&self) -> Option<ComponentRc> {
        self.overlays.borrow().focus().focused()
    }

    /// Shows `component` above everything else. It takes focus if currently visible.
    pub fn show_overlay(&mut self, component: ComponentRc, options: OverlayOptions) -> OverlayHandle {
        self.sync_viewport();
        let id = self.overlays.borrow_mut().push(component, options);
        self.request_render();
        OverlayHandle::new(id, Rc::downgrade(&self.overlays), Arc::clone(&self.wake))
    }

    /// Removes the topmost overlay.
    pub fn hide_overlay(&mut self) {
        self.sync_viewport();
        if self.overlays.borrow_mut().pop() {
            self.request_render();
        }
    }

    pub fn has_overlay(&self) -> bool {
        self.overlays.borrow().has_visible()
    }

    pub fn start(&mut self) -> io::Result<()> {
        if !self.stopped {
            return Ok(());
        }
        self.output = OutputGate::new();
        self.wake.reset_for_start();
        self.renderer.reset();
        self.stopped = false;

        #[cfg(all(unix, not(test)))]
        self.install_cleanup_hooks();

        let wake_capability = Arc::clone(&self.wake);
        self.terminal
            .set_capability_listener(Box::new(move |event| wake_capability.push_capability(event)));

        let wake_input = Arc::clone(&self.wake);
        let wake_resize = Arc::clone(&self.wake);
        if let Err(err) = self.terminal.start(
            Box::new(move |data| wake_input.enqueue_input(data)),
            Box::new(move || wake_resize.signal_resize()),
        ) {
            self.stopped = true;
            #[cfg(all(unix, not(test)))]
            self.uninstall_cleanup_hooks();
            return Err(err);
        }

        self.output.push(TerminalCmd::HideCursor);
        self.flush_output();
        self.request_render();
        Ok(())
    }

    /// Leaves the cursor below the rendered content and hands the terminal back.
    pub fn stop(&mut self) -> io::Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.wake.request_stop();

        let below = self.renderer.cursor_below_content();
        if !below.is_empty() {
            self.output.push(TerminalCmd::Bytes(below));
        }
        self.output.push(TerminalCmd::ShowCursor);
        self.flush_output();

        self.terminal
            .drain_input(STOP_DRAIN_MAX_MS, STOP_DRAIN_IDLE_MS);
        let result = self.terminal.stop();
        self.stopped = true;
        #[cfg(all(unix, not(test)))]
        self.uninstall_cleanup_hooks();
        result
    }

    #[cfg(all(unix, not(test)))]
    fn install_cleanup_hooks(&mut self) {
        match crate::platform::install_signal_handlers(crate::platform::emergency_restore) {
            Ok(guard) => self.signal_hook_guard = Some(guard),
            Err(err) => warn!(%err, "could not install signal handlers"),
        }
        self.panic_hook_guard = Some(crate::platform::install_panic_hook(
            crate::platform::emergency_restore,
        ));
    }

    #[cfg(all(unix, not(test)))]
    fn uninstall_cleanup_hooks(&mut self) {
        self.signal_hook_guard = None;
        self.panic_hook_guard = None;
    }

    /// Blocks until work arrives, drains everything queued within a short coalescing window,
    /// then renders at most once.
    pub fn run_blocking_once(&mut self) -> Result<(), TuiError> {
        if self.stopped || !self.wake.wait_for_event() {
            return Ok(());
        }
        let start = Instant::now();
        let mut iterations = 0;
        while self.process_pending() && self.coalesce_budget.allows(start, iterations) {
            iterations += 1;
        }
        self.render_if_needed()
    }

    /// Processes whatever is queued without blocking, then renders if anything asked for it.
    pub fn run_once(&mut self) -> Result<(), TuiError> {
        if self.stopped {
            return Ok(());
        }
        self.process_pending();
        self.render_if_needed()
    }

    /// Delivers one input sequence to the focused component.
    pub fn handle_input(&mut self, data: &str) {
        self.sync_viewport();
        let Some(component) = self.focused() else {
            return;
        };
        {
            let mut component = component.borrow_mut();
            if is_key_release(data) && !component.wants_key_release() {
                return;
            }
            component.handle_input(data);
        }
        self.request_render();
    }

    /// Only sets a flag; the render happens on the next tick.
    pub fn request_render(&mut self) {
        self.wake.request_render();
    }

    pub fn render_if_needed(&mut self) -> Result<(), TuiError> {
        if self.stopped {
            return Ok(());
        }
        if self.wake.take_render_requested() {
            self.do_render()?;
        }
        self.flush_output();
        Ok(())
    }

    pub fn render_now(&mut self) -> Result<(), TuiError> {
        if self.stopped {
            return Err(TuiError::NotStarted);
        }
        self.wake.clear_render_requested();
        self.do_render()?;
        self.flush_output();
        Ok(())
    }

    fn process_pending(&mut self) -> bool {
        let mut did_work = false;

        if self.wake.take_pending_resize() {
            self.request_render();
            did_work = true;
        }

        for event in self.wake.drain_capabilities() {
            self.handle_capability(event);
            did_work = true;
        }

        for data in self.wake.drain_inputs() {
            self.handle_input(&data);
            did_work = true;
        }

        if let Some(title) = self.wake.take_pending_title() {
            self.output.push(TerminalCmd::SetTitle(title));
            did_work = true;
        }

        did_work
    }

    fn handle_capability(&mut self, event: CapabilityEvent) {
        debug!(?event, "capability event");
        match event {
            CapabilityEvent::CellSize(_) => {
                self.invalidate_all();
                self.request_render();
            }
            CapabilityEvent::AppearanceChanged(appearance) => {
                for callback in &mut self.appearance_callbacks {
                    callback(appearance);
                }
            }
            CapabilityEvent::KittyKeyboard(_) | CapabilityEvent::Sixel(_) => {}
        }
    }

    fn invalidate_all(&mut self) {
        self.root.borrow_mut().invalidate();
        let overlays: Vec<ComponentRc> = self
            .overlays
            .borrow()
            .entries()
            .iter()
            .map(|entry| Rc::clone(entry.component()))
            .collect();
        for component in overlays {
            component.borrow_mut().invalidate();
        }
    }

    fn sync_viewport(&mut self) {
        let columns = self.terminal.columns() as usize;
        let rows = self.terminal.rows() as usize;
        let mut overlays = self.overlays.borrow_mut();
        overlays.set_viewport(columns, rows);
        overlays.reconcile();
    }

    fn do_render(&mut self) -> Result<(), TuiError> {
        let width = self.terminal.columns() as usize;
        let height = self.terminal.rows() as usize;
        self.sync_viewport();

        let (mut lines, mut cursor) = {
            let mut root = self.root.borrow_mut();
            let lines = root.render(width);
            (lines, root.cursor_pos())
        };

        let has_overlays = self.has_overlay();
        if has_overlays {
            let (composited, overlay_cursor) = self.composite_overlay_lines(lines, width, height);
            lines = composited;
            if overlay_cursor.is_some() {
                cursor = overlay_cursor;
            }
        }

        let options = RenderOptions {
            width,
            height,
            clear_on_shrink: self.clear_on_shrink,
            has_overlays,
            show_hardware_cursor: self.show_hardware_cursor,
            cursor,
        };
        match self.renderer.render(lines.clone(), &options) {
            Ok(output) => {
                if !output.bytes.is_empty() {
                    self.output.push(TerminalCmd::Bytes(output.bytes));
                }
                Ok(())
            }
            Err(err) => Err(self.fail_render(&err, &lines, width, height)),
        }
    }

    /// Dumps the offending frame, restores the terminal and turns the render error into the
    /// runtime's error.
    fn fail_render(
        &mut self,
        err: &RenderError,
        frame: &[String],
        width: usize,
        height: usize,
    ) -> TuiError {
        let RenderError::WidthOverflow {
            row,
            line_width,
            terminal_width,
        } = *err;
        error!(row, line_width, terminal_width, "rendered line is wider than the terminal");

        let report = CrashReport {
            reason: err.to_string(),
            terminal_width: width,
            terminal_height: height,
            previous_lines: self.renderer.committed_lines(),
            new_lines: frame,
        };
        let crash_log = self
            .config
            .crash_log_path()
            .filter(|path| match write_crash_log(path, &report) {
                Ok(()) => true,
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not write crash log");
                    false
                }
            });

        if let Err(err) = self.stop() {
            warn!(%err, "terminal stop failed after render error");
        }

        TuiError::WidthOverflow {
            row,
            line_width,
            terminal_width,
            crash_log,
        }
    }

    fn composite_overlay_lines(
        &mut self,
        lines: Vec<String>,
        width: usize,
        height: usize,
    ) -> (Vec<String>, Option<CursorPos>) {
        // Components render with no stack borrow held: a render may use its overlay handle.
        let planned: Vec<(u64, ComponentRc, OverlaySize)> = self
            .overlays
            .borrow()
            .visible()
            .map(|entry| {
                (
                    entry.id(),
                    Rc::clone(entry.component()),
                    resolve_overlay_size(entry.options(), width, height),
                )
            })
            .collect();

        let mut overlays = Vec::with_capacity(planned.len());
        let mut cursors = Vec::with_capacity(planned.len());
        for (id, component, size) in planned {
            let (mut overlay_lines, cursor) = {
                let mut component = component.borrow_mut();
                let rendered = component.render(size.width);
                (rendered, component.cursor_pos())
            };
            if let Some(max_height) = size.max_height {
                overlay_lines.truncate(max_height);
            }
            let position = self.overlays.borrow().entry(id).map(|entry| {
                resolve_overlay_position(
                    entry.options(),
                    size.width,
                    overlay_lines.len(),
                    width,
                    height,
                )
            });
            let Some((row, col)) = position else {
                continue;
            };
            overlays.push(RenderedOverlay {
                lines: overlay_lines,
                row,
                col,
                width: size.width,
            });
            cursors.push(cursor);
        }

        let composited = composite_overlays(
            lines,
            &overlays,
            width,
            height,
            self.renderer.max_lines_rendered(),
        );

        let viewport_start = composited.len().saturating_sub(height);
        let mut overlay_cursor = None;
        for (overlay, cursor) in overlays.iter().zip(cursors) {
            let Some(cursor) = cursor else {
                continue;
            };
            let Some(line) = overlay.lines.get(cursor.row) else {
                continue;
            };
            if cursor.col >= overlay.width || is_image_line(line) {
                continue;
            }
            let row = viewport_start + overlay.row + cursor.row;
            if composited.get(row).map_or(true, |line| is_image_line(line)) {
                continue;
            }
            overlay_cursor = Some(CursorPos {
                row,
                col: overlay.col + cursor.col,
            });
        }

        (composited, overlay_cursor)
    }

    fn flush_output(&mut self) {
        self.output.flush(&mut self.terminal);
    }
}

impl<T: Terminal> Drop for TuiRuntime<T> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        // Never panic in Drop, especially while already unwinding.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = self.stop();
        }));
    }
}
