//! Typed publish/subscribe channels for group changes.
//!
//! The storage manager fires these after a mutation has been persisted.
//! Consumers (session tags, context menus, UI bridges) subscribe with plain
//! callbacks and must not write back into the map directly.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{GroupTab, TabId};

/// Group or member insertion
#[derive(Debug, Clone, PartialEq)]
pub enum AddEvent {
    GroupTabAdded { group: GroupTab },
    InnerTabAdded { group: GroupTab, index: usize },
}

/// Group or member removal
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveEvent {
    GroupTabRemoved { group: GroupTab },
    InnerTabRemoved { group: GroupTab, tab_id: TabId },
}

/// In-place changes to an existing group
#[derive(Debug, Clone, PartialEq)]
pub enum EditEvent {
    /// Rename, icon, visibility or closed-mode change
    GroupTabEdited { group: GroupTab },
    /// Whole-record replacement, including member reorders
    GroupTabReplaced { group: GroupTab },
}

impl AddEvent {
    pub fn group(&self) -> &GroupTab {
        match self {
            Self::GroupTabAdded { group } | Self::InnerTabAdded { group, .. } => group,
        }
    }
}

impl RemoveEvent {
    pub fn group(&self) -> &GroupTab {
        match self {
            Self::GroupTabRemoved { group } | Self::InnerTabRemoved { group, .. } => group,
        }
    }
}

impl EditEvent {
    pub fn group(&self) -> &GroupTab {
        match self {
            Self::GroupTabEdited { group } | Self::GroupTabReplaced { group } => group,
        }
    }
}

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A single typed channel
pub struct Notifier<E> {
    listeners: RwLock<Vec<Listener<E>>>,
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener. Returns false if this exact listener is already registered.
    pub fn subscribe(&self, listener: Listener<E>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, listener: &Listener<E>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener in registration order.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    pub fn notify(&self, event: &E)
    where
        E: std::fmt::Debug,
    {
        // Snapshot so listeners may (un)subscribe while being called.
        let listeners: Vec<Listener<E>> = self.listeners.read().clone();
        for (i, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!("Listener #{} panicked while handling {:?}", i, event);
            }
        }
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three channels fired by the storage manager
#[derive(Default)]
pub struct Notifiers {
    pub add: Notifier<AddEvent>,
    pub remove: Notifier<RemoveEvent>,
    pub edit: Notifier<EditEvent>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn group() -> GroupTab {
        GroupTab::new(1, "g", vec![]).unwrap()
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let notifier: Notifier<EditEvent> = Notifier::new();
        let listener: Listener<EditEvent> = Arc::new(|_| {});
        assert!(notifier.subscribe(listener.clone()));
        assert!(!notifier.subscribe(listener.clone()));
        assert_eq!(notifier.len(), 1);
        assert!(notifier.unsubscribe(&listener));
        assert!(!notifier.unsubscribe(&listener));
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_delivery_order() {
        let notifier: Notifier<AddEvent> = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = seen.clone();
            notifier.subscribe(Arc::new(move |_| seen.lock().push(n)));
        }
        notifier.notify(&AddEvent::GroupTabAdded { group: group() });
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let notifier: Notifier<RemoveEvent> = Notifier::new();
        let hits = Arc::new(Mutex::new(0));
        notifier.subscribe(Arc::new(|_| panic!("boom")));
        let counter = hits.clone();
        notifier.subscribe(Arc::new(move |_| *counter.lock() += 1));

        notifier.notify(&RemoveEvent::InnerTabRemoved {
            group: group(),
            tab_id: 4,
        });
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_inner_tab_added_at_zero_keeps_index() {
        let event = AddEvent::InnerTabAdded {
            group: group(),
            index: 0,
        };
        assert!(matches!(event, AddEvent::InnerTabAdded { index: 0, .. }));
        assert_eq!(event.group().id, 1);
    }
}
