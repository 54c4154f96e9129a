//! Single-threaded listener registry used for viewport and pointer events.
//!
//! An [`EventSource`] is a cheap cloneable handle to a shared list of
//! listeners. Subscribing returns a [`ListenerBinding`] that removes the
//! listener exactly once, either through
//! [`unsubscribe`](ListenerBinding::unsubscribe) or on drop.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Listener<E> = Rc<RefCell<dyn FnMut(&E)>>;

/// Identifier of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

impl<E> Registry<E> {
    fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(l, _)| *l == id)
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }
}

/// Shared source of events of type `E`.
pub struct EventSource<E> {
    inner: Rc<RefCell<Registry<E>>>,
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventSource<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventSource<E> {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned binding
    /// is unsubscribed or dropped.
    pub fn subscribe(&self, listener: impl FnMut(&E) + 'static) -> ListenerBinding<E> {
        let listener: Listener<E> = Rc::new(RefCell::new(listener));
        let mut registry = self.inner.borrow_mut();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, listener));
        ListenerBinding {
            registry: Rc::downgrade(&self.inner),
            id,
            active: true,
        }
    }

    /// Deliver `event` to every registered listener and return how many
    /// were invoked.
    ///
    /// Listeners removed by an earlier listener during the same dispatch
    /// are skipped. A listener that re-enters dispatch on itself is skipped
    /// for the nested call.
    pub fn dispatch(&self, event: &E) -> usize {
        let snapshot: Vec<(ListenerId, Listener<E>)> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(id, l)| (*id, Rc::clone(l)))
            .collect();

        let mut invoked = 0;
        for (id, listener) in snapshot {
            if !self.inner.borrow().contains(id) {
                continue;
            }
            if let Ok(mut f) = listener.try_borrow_mut() {
                (f)(event);
                invoked += 1;
            }
        }
        invoked
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

/// Registration of one listener on an [`EventSource`].
pub struct ListenerBinding<E> {
    registry: Weak<RefCell<Registry<E>>>,
    id: ListenerId,
    active: bool,
}

impl<E> ListenerBinding<E> {
    /// Remove the listener. Returns `true` only for the call that actually
    /// removed it; later calls are no-ops.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.borrow_mut().remove(self.id))
    }

    /// Whether the listener is still registered through this binding.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The listener id.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl<E> Drop for ListenerBinding<E> {
    fn drop(&mut self) {
        let _ = self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn dispatch_reaches_every_listener() {
        let source = EventSource::<u32>::new();
        let total = Rc::new(Cell::new(0));
        let a = Rc::clone(&total);
        let b = Rc::clone(&total);
        let _first = source.subscribe(move |v| a.set(a.get() + v));
        let _second = source.subscribe(move |v| b.set(b.get() + v * 10));

        assert_eq!(source.dispatch(&2), 2);
        assert_eq!(total.get(), 22);
    }

    #[test]
    fn unsubscribe_removes_exactly_once() {
        let source = EventSource::<()>::new();
        let mut binding = source.subscribe(|()| {});
        assert_eq!(source.listener_count(), 1);

        assert!(binding.unsubscribe());
        assert!(!binding.unsubscribe());
        assert!(!binding.is_active());
        assert_eq!(source.listener_count(), 0);
        assert_eq!(source.dispatch(&()), 0);
    }

    #[test]
    fn dropping_binding_unsubscribes() {
        let source = EventSource::<()>::new();
        {
            let _binding = source.subscribe(|()| {});
            assert_eq!(source.listener_count(), 1);
        }
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let source = EventSource::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<ListenerBinding<()>>>> = Rc::new(RefCell::new(None));

        let victim_slot = Rc::clone(&victim);
        let _killer = source.subscribe(move |()| {
            if let Some(mut b) = victim_slot.borrow_mut().take() {
                let _ = b.unsubscribe();
            }
        });
        let counter = Rc::clone(&hits);
        *victim.borrow_mut() =
            Some(source.subscribe(move |()| counter.set(counter.get() + 1)));

        assert_eq!(source.dispatch(&()), 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(source.listener_count(), 1);
    }

    #[test]
    fn binding_outliving_source_is_harmless() {
        let source = EventSource::<()>::new();
        let mut binding = source.subscribe(|()| {});
        drop(source);
        assert!(!binding.unsubscribe());
    }
}
