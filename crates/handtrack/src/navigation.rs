//! Screen routing.

use std::sync::{Arc, Mutex};

/// The home screen.
pub const ROOT: &str = "/";
/// The hand tracking screen.
pub const HAND_TRACK: &str = "/hand-track";

/// Something that can switch the application to another screen.
pub trait Navigator: Send {
    fn push(&mut self, route: &str);
}

impl<N: Navigator> Navigator for Arc<Mutex<N>> {
    fn push(&mut self, route: &str) {
        match self.lock() {
            Ok(mut nav) => nav.push(route),
            Err(poisoned) => poisoned.into_inner().push(route),
        }
    }
}

impl<N: Navigator + ?Sized> Navigator for Box<N> {
    fn push(&mut self, route: &str) {
        (**self).push(route)
    }
}

/// An in-process history stack of visited routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    stack: Vec<String>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(ROOT)
    }
}

impl History {
    pub fn new(initial: &str) -> Self {
        Self {
            stack: vec![initial.to_string()],
        }
    }

    /// Returns the route that is currently shown.
    pub fn current(&self) -> &str {
        // Never empty: `go_back` keeps the first entry.
        self.stack.last().map_or(ROOT, String::as_str)
    }

    /// Returns to the previous route. Does nothing on the first route.
    pub fn go_back(&mut self) -> &str {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        self.current()
    }

    /// Returns the number of routes on the stack, including the root.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl Navigator for History {
    fn push(&mut self, route: &str) {
        log::info!("navigating from {} to {}", self.current(), route);
        self.stack.push(route.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_go_back() {
        let mut history = History::default();
        assert_eq!(history.current(), ROOT);
        history.push(HAND_TRACK);
        assert_eq!(history.current(), HAND_TRACK);
        assert_eq!(history.depth(), 2);

        assert_eq!(history.go_back(), ROOT);
        assert_eq!(history.go_back(), ROOT);
        assert_eq!(history.depth(), 1);
    }

    #[test]
    fn shared_navigator() {
        let history = Arc::new(Mutex::new(History::default()));
        let mut nav: Box<dyn Navigator> = Box::new(history.clone());
        nav.push(HAND_TRACK);
        nav.push(ROOT);
        let history = history.lock().unwrap();
        assert_eq!(history.current(), ROOT);
        assert_eq!(history.depth(), 3);
    }
}
