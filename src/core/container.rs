use std::rc::Rc;

use crate::core::component::{Component, ComponentRc};

/// Stacks children vertically in insertion order.
#[derive(Default)]
pub struct Container {
    children: Vec<ComponentRc>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&mut self, component: ComponentRc) {
        self.children.push(component);
    }

    /// Removes `component` by identity. Returns whether it was a child.
    pub fn remove_child(&mut self, component: &ComponentRc) -> bool {
        let before = self.children.len();
        self.children.retain(|child| !Rc::ptr_eq(child, component));
        self.children.len() != before
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Component for Container {
    fn render(&mut self, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for child in &self.children {
            lines.extend(child.borrow_mut().render(width));
        }
        lines
    }

    fn invalidate(&mut self) {
        for child in &self.children {
            child.borrow_mut().invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Container;
    use crate::core::component::{component_rc, Component};

    struct StaticComponent {
        lines: Vec<&'static str>,
    }

    impl StaticComponent {
        fn new(lines: Vec<&'static str>) -> Self {
            Self { lines }
        }
    }

    impl Component for StaticComponent {
        fn render(&mut self, _width: usize) -> Vec<String> {
            self.lines.iter().map(|line| line.to_string()).collect()
        }

        fn invalidate(&mut self) {
            self.lines.push("invalidated");
        }
    }

    #[test]
    fn container_concatenates_children() {
        let mut container = Container::new();
        container.add_child(component_rc(StaticComponent::new(vec!["one"])));
        container.add_child(component_rc(StaticComponent::new(vec!["two", "three"])));

        assert_eq!(container.render(10), vec!["one", "two", "three"]);
    }

    #[test]
    fn remove_child_uses_identity() {
        let mut container = Container::new();
        let first = component_rc(StaticComponent::new(vec!["same"]));
        let second = component_rc(StaticComponent::new(vec!["same"]));
        container.add_child(first.clone());
        container.add_child(second);

        assert!(container.remove_child(&first));
        assert!(!container.remove_child(&first));
        assert_eq!(container.len(), 1);
        assert_eq!(container.render(10), vec!["same"]);
    }

    #[test]
    fn invalidate_reaches_every_child() {
        let mut container = Container::new();
        container.add_child(component_rc(StaticComponent::new(vec!["a"])));
        container.add_child(component_rc(StaticComponent::new(vec!["b"])));
        container.invalidate();
        assert_eq!(
            container.render(10),
            vec!["a", "invalidated", "b", "invalidated"]
        );
    }
}
