//! Component and Focusable traits.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cursor::CursorPos;

/// Renderable component interface.
///
/// The renderer only ever calls what is on this trait; widget internals are opaque to it.
pub trait Component {
    /// Render to a list of lines at the given width.
    ///
    /// Every line must fit in `width` visible columns. A wider line aborts the render.
    fn render(&mut self, width: usize) -> Vec<String>;

    /// Handle raw input (a key sequence or a bracketed paste).
    fn handle_input(&mut self, _data: &str) {}

    /// Whether this component wants key-release events.
    fn wants_key_release(&self) -> bool {
        false
    }

    /// Invalidate any cached state.
    fn invalidate(&mut self) {}

    /// Cursor position relative to the lines returned from the last `render()`.
    ///
    /// Takes precedence over an embedded cursor marker.
    fn cursor_pos(&self) -> Option<CursorPos> {
        None
    }

    fn as_focusable(&mut self) -> Option<&mut dyn Focusable> {
        None
    }
}

/// Focusable behavior for components that track focus.
pub trait Focusable {
    fn set_focused(&mut self, focused: bool);
    fn is_focused(&self) -> bool;
}

pub type ComponentRc = Rc<RefCell<Box<dyn Component>>>;

/// Wraps a component for shared ownership between the tree, focus and overlays.
pub fn component_rc<C: Component + 'static>(component: C) -> ComponentRc {
    Rc::new(RefCell::new(Box::new(component)))
}
