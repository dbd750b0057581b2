//! Single-owner input focus.

use std::rc::Rc;

use crate::core::component::ComponentRc;

/// Holds at most one focused component and keeps its `Focusable` flag in sync.
#[derive(Default)]
pub struct FocusState {
    focused: Option<ComponentRc>,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves focus to `target`. Setting the already-focused component is a no-op.
    ///
    /// Borrows both the old and new component mutably, so it must not run while either is
    /// already borrowed.
    pub fn set_focus(&mut self, target: Option<ComponentRc>) {
        if self.is_focused_opt(target.as_ref()) {
            return;
        }

        if let Some(previous) = self.focused.take() {
            if let Some(focusable) = previous.borrow_mut().as_focusable() {
                focusable.set_focused(false);
            }
        }

        if let Some(next) = target {
            if let Some(focusable) = next.borrow_mut().as_focusable() {
                focusable.set_focused(true);
            }
            self.focused = Some(next);
        }
    }

    pub fn clear(&mut self) {
        self.set_focus(None);
    }

    pub fn focused(&self) -> Option<ComponentRc> {
        self.focused.clone()
    }

    /// Identity check that never borrows the component.
    pub fn is_focused(&self, component: &ComponentRc) -> bool {
        self.focused
            .as_ref()
            .is_some_and(|focused| Rc::ptr_eq(focused, component))
    }

    fn is_focused_opt(&self, target: Option<&ComponentRc>) -> bool {
        match (self.focused.as_ref(), target) {
            (Some(current), Some(next)) => Rc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FocusState;
    use crate::core::component::{component_rc, Component, Focusable};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Field {
        focused: Rc<Cell<bool>>,
        toggles: Rc<Cell<usize>>,
    }

    impl Component for Field {
        fn render(&mut self, _width: usize) -> Vec<String> {
            Vec::new()
        }

        fn as_focusable(&mut self) -> Option<&mut dyn Focusable> {
            Some(self)
        }
    }

    impl Focusable for Field {
        fn set_focused(&mut self, focused: bool) {
            self.focused.set(focused);
            self.toggles.set(self.toggles.get() + 1);
        }

        fn is_focused(&self) -> bool {
            self.focused.get()
        }
    }

    struct Label;

    impl Component for Label {
        fn render(&mut self, _width: usize) -> Vec<String> {
            vec!["label".to_string()]
        }
    }

    #[test]
    fn moving_focus_updates_both_flags() {
        let first_flag = Rc::new(Cell::new(false));
        let second_flag = Rc::new(Cell::new(false));
        let toggles = Rc::new(Cell::new(0));
        let first = component_rc(Field {
            focused: Rc::clone(&first_flag),
            toggles: Rc::clone(&toggles),
        });
        let second = component_rc(Field {
            focused: Rc::clone(&second_flag),
            toggles: Rc::clone(&toggles),
        });

        let mut focus = FocusState::new();
        focus.set_focus(Some(first.clone()));
        assert!(first_flag.get());
        assert!(focus.is_focused(&first));

        focus.set_focus(Some(second.clone()));
        assert!(!first_flag.get());
        assert!(second_flag.get());

        focus.clear();
        assert!(!second_flag.get());
        assert!(focus.focused().is_none());
    }

    #[test]
    fn refocusing_the_same_component_does_not_toggle() {
        let toggles = Rc::new(Cell::new(0));
        let field = component_rc(Field {
            focused: Rc::new(Cell::new(false)),
            toggles: Rc::clone(&toggles),
        });

        let mut focus = FocusState::new();
        focus.set_focus(Some(field.clone()));
        focus.set_focus(Some(field));
        assert_eq!(toggles.get(), 1);
    }

    #[test]
    fn non_focusable_components_can_hold_focus() {
        let label = component_rc(Label);
        let mut focus = FocusState::new();
        focus.set_focus(Some(label.clone()));
        assert!(focus.is_focused(&label));
    }
}
