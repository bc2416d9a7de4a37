//! In-process ORM event dispatcher.
//!
//! Listeners subscribe per event type, or to `*` for every event. Delivery
//! is synchronous and in subscription order.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::ports::{OrmEvent, OrmEventPublisher, OrmListener};

/// Subscribe to every event type
pub const ALL_EVENTS: &str = "*";

/// Event dispatcher shared by the database layer and entity managers.
///
/// # Example
///
/// ```ignore
/// let events = Arc::new(EventDispatcher::new());
/// events.subscribe(OrmEvent::ENTITY_PERSISTED, Arc::new(CacheInvalidationListener::new(factory)));
/// events.publish(OrmEvent::EntityPersisted { role: "post".into(), operation: Operation::Insert });
/// ```
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn OrmListener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe one listener to several event types.
    pub fn subscribe_all(&self, event_types: &[&str], listener: Arc<dyn OrmListener>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for event_type in event_types {
            listeners
                .entry(event_type.to_string())
                .or_default()
                .push(Arc::clone(&listener));
        }
    }

    /// Names of listeners subscribed to an event type, wildcard listeners included
    pub fn listener_names(&self, event_type: &str) -> Vec<&'static str> {
        self.listeners_for(event_type)
            .iter()
            .map(|listener| listener.name())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn listeners_for(&self, event_type: &str) -> Vec<Arc<dyn OrmListener>> {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        listeners
            .get(event_type)
            .into_iter()
            .chain(listeners.get(ALL_EVENTS))
            .flatten()
            .cloned()
            .collect()
    }
}

impl OrmEventPublisher for EventDispatcher {
    fn publish(&self, event: OrmEvent) {
        // Clone listeners to release the lock before invoking them
        for listener in self.listeners_for(event.event_type()) {
            listener.handle(&event);
        }
    }

    fn subscribe(&self, event_type: &str, listener: Arc<dyn OrmListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Operation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl OrmListener for Counter {
        fn handle(&self, _: &OrmEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "Counter"
        }
    }

    fn persisted() -> OrmEvent {
        OrmEvent::EntityPersisted {
            role: "post".to_string(),
            operation: Operation::Insert,
        }
    }

    #[test]
    fn listener_receives_matching_events_only() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        dispatcher.subscribe(OrmEvent::ENTITY_PERSISTED, counter.clone());

        dispatcher.publish(persisted());
        dispatcher.publish(OrmEvent::EntityLoaded {
            role: "post".to_string(),
            count: 2,
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_listener_receives_everything() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        dispatcher.subscribe(ALL_EVENTS, counter.clone());

        dispatcher.publish(persisted());
        dispatcher.publish(OrmEvent::QueryFailed {
            connection: "default".to_string(),
            sql: "SELECT".to_string(),
            error: "boom".to_string(),
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribe_all_registers_each_type() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        dispatcher.subscribe_all(
            &[OrmEvent::QUERY_EXECUTED, OrmEvent::QUERY_FAILED],
            counter,
        );
        assert_eq!(dispatcher.listener_count(), 2);
        assert_eq!(dispatcher.listener_names(OrmEvent::QUERY_FAILED), vec!["Counter"]);
    }
}
