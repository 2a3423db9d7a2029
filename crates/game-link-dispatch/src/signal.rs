//! Same-thread change notification
//!
//! A [`Signal`] is a list of handlers owned by the object that raises it. It
//! is not thread-safe; handlers that need to reach another thread post a task
//! from inside the handler.

/// Identifies one handler registered on a [`Signal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalConnection(u64);

/// Handlers invoked with `&A` each time the signal is raised
pub struct Signal<A> {
    next: u64,
    handlers: Vec<(SignalConnection, Box<dyn FnMut(&A)>)>,
}

impl<A> Signal<A> {
    pub fn new() -> Self {
        Self {
            next: 0,
            handlers: Vec::new(),
        }
    }

    /// Register a handler. Handlers run in registration order.
    pub fn add(&mut self, handler: impl FnMut(&A) + 'static) -> SignalConnection {
        self.next += 1;
        let connection = SignalConnection(self.next);
        self.handlers.push((connection, Box::new(handler)));
        connection
    }

    /// Unregister a handler. Returns false if it was not connected.
    pub fn remove(&mut self, connection: SignalConnection) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(c, _)| *c != connection);
        self.handlers.len() != before
    }

    pub fn raise(&mut self, args: &A) {
        for (_, handler) in &mut self.handlers {
            handler(args);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("handlers", &self.handlers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_raise_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::new();

        let a = seen.clone();
        signal.add(move |v: &u32| a.borrow_mut().push(("a", *v)));
        let b = seen.clone();
        signal.add(move |v: &u32| b.borrow_mut().push(("b", *v)));

        signal.raise(&1);
        signal.raise(&2);
        assert_eq!(*seen.borrow(), vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn test_remove() {
        let count = Rc::new(RefCell::new(0));
        let mut signal = Signal::<()>::default();

        let c = count.clone();
        let connection = signal.add(move |_| *c.borrow_mut() += 1);
        assert_eq!(signal.len(), 1);

        signal.raise(&());
        assert!(signal.remove(connection));
        assert!(!signal.remove(connection));
        assert!(signal.is_empty());

        signal.raise(&());
        assert_eq!(*count.borrow(), 1);
    }
}
