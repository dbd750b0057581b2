//! Overlay stack and the focus rules that go with it.
//!
//! Later entries draw on top. Each entry remembers what held focus when it was shown; focus
//! falls back along that chain when a focused overlay is hidden or stops being visible.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::core::component::ComponentRc;
use crate::render::overlay::OverlayOptions;
use crate::runtime::focus::FocusState;
use crate::runtime::tui::RuntimeWake;

pub struct OverlayEntry {
    id: u64,
    component: ComponentRc,
    options: OverlayOptions,
    pre_focus: Option<ComponentRc>,
    hidden: bool,
}

impl OverlayEntry {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn component(&self) -> &ComponentRc {
        &self.component
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn is_visible(&self, (columns, rows): (usize, usize)) -> bool {
        !self.hidden && self.options.is_visible(columns, rows)
    }
}

/// Focus changes requested through an [`OverlayHandle`]. Handles may be used from inside a
/// component callback, where focus cannot be moved without re-borrowing that component, so the
/// change waits for [`OverlayStack::reconcile`].
enum PendingFocus {
    /// The focused overlay went away; fall back to the topmost visible overlay or this target.
    Release(Option<ComponentRc>),
    /// An overlay was unhidden and should take focus if it is visible.
    Grab(u64),
}

/// Overlays plus the runtime's focus, kept together so focus rules see both.
#[derive(Default)]
pub struct OverlayStack {
    entries: Vec<OverlayEntry>,
    next_id: u64,
    focus: FocusState,
    viewport: (usize, usize),
    pending: Vec<PendingFocus>,
}

impl OverlayStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> &FocusState {
        &self.focus
    }

    pub fn set_focus(&mut self, target: Option<ComponentRc>) {
        self.focus.set_focus(target);
    }

    /// Terminal size used for visibility predicates.
    pub fn set_viewport(&mut self, columns: usize, rows: usize) {
        self.viewport = (columns, rows);
    }

    pub fn entries(&self) -> &[OverlayEntry] {
        &self.entries
    }

    pub fn has_visible(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.is_visible(self.viewport))
    }

    /// Visible entries bottom to top.
    pub fn visible(&self) -> impl Iterator<Item = &OverlayEntry> {
        let viewport = self.viewport;
        self.entries
            .iter()
            .filter(move |entry| entry.is_visible(viewport))
    }

    pub fn entry(&self, id: u64) -> Option<&OverlayEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Pushes an overlay, focusing it if it is visible.
    pub fn push(&mut self, component: ComponentRc, options: OverlayOptions) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let entry = OverlayEntry {
            id,
            component: Rc::clone(&component),
            options,
            pre_focus: self.focus.focused(),
            hidden: false,
        };
        let visible = entry.is_visible(self.viewport);
        self.entries.push(entry);
        if visible {
            self.focus.set_focus(Some(component));
        }
        id
    }

    /// Removes the topmost overlay and settles focus immediately.
    pub fn pop(&mut self) -> bool {
        let Some(last) = self.entries.len().checked_sub(1) else {
            return false;
        };
        if let Some(fallback) = self.remove_at(last) {
            self.release_focus(fallback);
        }
        true
    }

    /// Applies focus changes queued by handles, then makes sure focus is not held by an
    /// overlay that has stopped being visible.
    pub fn reconcile(&mut self) {
        for pending in std::mem::take(&mut self.pending) {
            match pending {
                PendingFocus::Release(fallback) => self.release_focus(fallback),
                PendingFocus::Grab(id) => self.grab_focus(id),
            }
        }

        let lost = self
            .entries
            .iter()
            .find(|entry| self.focus.is_focused(&entry.component))
            .filter(|entry| !entry.is_visible(self.viewport))
            .map(|entry| entry.pre_focus.clone());
        if let Some(fallback) = lost {
            self.release_focus(fallback);
        }
    }

    fn remove(&mut self, id: u64) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        if let Some(fallback) = self.remove_at(index) {
            self.pending.push(PendingFocus::Release(fallback));
        }
        true
    }

    fn set_hidden(&mut self, id: u64, hidden: bool) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) else {
            return false;
        };
        if entry.hidden == hidden {
            return false;
        }
        entry.hidden = hidden;
        if hidden {
            if self.focus.is_focused(&entry.component) {
                let fallback = entry.pre_focus.clone();
                self.pending.push(PendingFocus::Release(fallback));
            }
        } else {
            self.pending.push(PendingFocus::Grab(id));
        }
        true
    }

    /// Removes an entry. Returns the focus fallback when the entry held focus.
    fn remove_at(&mut self, index: usize) -> Option<Option<ComponentRc>> {
        let removed = self.entries.remove(index);
        // Entries shown while the removed overlay was focused fall back past it.
        for entry in &mut self.entries {
            if entry
                .pre_focus
                .as_ref()
                .is_some_and(|pre| Rc::ptr_eq(pre, &removed.component))
            {
                entry.pre_focus = removed.pre_focus.clone();
            }
        }
        self.focus
            .is_focused(&removed.component)
            .then_some(removed.pre_focus)
    }

    fn release_focus(&mut self, fallback: Option<ComponentRc>) {
        let next = self.topmost_visible().or(fallback);
        self.focus.set_focus(next);
    }

    fn grab_focus(&mut self, id: u64) {
        let viewport = self.viewport;
        let previous = self.focus.focused();
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) else {
            return;
        };
        if !entry.is_visible(viewport) || self.focus.is_focused(&entry.component) {
            return;
        }
        entry.pre_focus = previous;
        let component = Rc::clone(&entry.component);
        self.focus.set_focus(Some(component));
    }

    fn topmost_visible(&self) -> Option<ComponentRc> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.is_visible(self.viewport))
            .map(|entry| Rc::clone(&entry.component))
    }
}

/// Controls one shown overlay. Outlives the overlay harmlessly: once it is gone every call is
/// a no-op.
pub struct OverlayHandle {
    id: u64,
    stack: Weak<RefCell<OverlayStack>>,
    wake: Arc<RuntimeWake>,
}

impl OverlayHandle {
    pub(crate) fn new(id: u64, stack: Weak<RefCell<OverlayStack>>, wake: Arc<RuntimeWake>) -> Self {
        Self { id, stack, wake }
    }

    pub fn hide(&self) {
        let Some(stack) = self.stack.upgrade() else {
            return;
        };
        if stack.borrow_mut().remove(self.id) {
            self.wake.request_render();
        }
    }

    pub fn set_hidden(&self, hidden: bool) {
        let Some(stack) = self.stack.upgrade() else {
            return;
        };
        if stack.borrow_mut().set_hidden(self.id, hidden) {
            self.wake.request_render();
        }
    }

    /// True once hidden or removed.
    pub fn is_hidden(&self) -> bool {
        self.stack.upgrade().map_or(true, |stack| {
            stack
                .borrow()
                .entry(self.id)
                .map_or(true, OverlayEntry::is_hidden)
        })
    }
}
