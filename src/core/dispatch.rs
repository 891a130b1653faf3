//! Typed event dispatch table.
//!
//! Each adapter owns one [`EventDispatcher`] mapping a message tag to an
//! ordered list of async callbacks. Every callback registered for a tag is
//! invoked, in registration order, for every event carrying that tag, and the
//! whole list completes before the adapter reads its next message.
//!
//! # Reentrancy
//!
//! The callback list for a tag is snapshotted before the first callback runs.
//! A callback registered while an event is being dispatched therefore takes
//! effect from the next event, and [`EventDispatcher::clear`] during dispatch
//! does not stop callbacks already in the snapshot.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

/// An event that can be routed by tag.
pub trait Tagged: Clone + Send + 'static {
    type Tag: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn tag(&self) -> Self::Tag;
}

/// Callback type for dispatched events.
pub type EventCallback<E> =
    Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Tag-keyed table of ordered callbacks.
pub struct EventDispatcher<E: Tagged> {
    table: RwLock<HashMap<E::Tag, Vec<EventCallback<E>>>>,
}

impl<E: Tagged> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Append a callback for `tag`.
    pub fn subscribe(&self, tag: E::Tag, callback: EventCallback<E>) {
        self.table.write().entry(tag).or_default().push(callback);
    }

    /// Deliver `event` to every callback registered for its tag.
    ///
    /// Returns the number of callbacks invoked.
    pub async fn dispatch(&self, event: E) -> usize {
        let tag = event.tag();
        let snapshot: Vec<EventCallback<E>> = match self.table.read().get(&tag) {
            Some(callbacks) => callbacks.clone(),
            None => {
                tracing::trace!(?tag, "No subscribers for event");
                return 0;
            }
        };

        let count = snapshot.len();
        for callback in snapshot {
            callback(event.clone()).await;
        }
        count
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.table.write().clear();
    }

    pub fn subscriber_count(&self, tag: E::Tag) -> usize {
        self.table.read().get(&tag).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().values().all(Vec::is_empty)
    }
}

impl<E: Tagged> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    #[derive(Debug, Clone)]
    struct Event {
        kind: Kind,
        seq: u32,
    }

    impl Tagged for Event {
        type Tag = Kind;

        fn tag(&self) -> Kind {
            self.kind
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> EventCallback<Event> {
        let log = log.clone();
        Arc::new(move |event: Event| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push(format!("{}:{}", name, event.seq));
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }

    #[tokio::test]
    async fn test_callbacks_run_in_registration_order() {
        let dispatcher = EventDispatcher::<Event>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.subscribe(Kind::Ping, recorder(&log, "first"));
        dispatcher.subscribe(Kind::Ping, recorder(&log, "second"));
        dispatcher.subscribe(Kind::Ping, recorder(&log, "third"));

        let invoked = dispatcher
            .dispatch(Event {
                kind: Kind::Ping,
                seq: 1,
            })
            .await;

        assert_eq!(invoked, 3);
        assert_eq!(*log.lock(), vec!["first:1", "second:1", "third:1"]);
    }

    #[tokio::test]
    async fn test_only_matching_tag_invoked() {
        let dispatcher = EventDispatcher::<Event>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.subscribe(Kind::Ping, recorder(&log, "ping"));
        dispatcher.subscribe(Kind::Pong, recorder(&log, "pong"));

        dispatcher
            .dispatch(Event {
                kind: Kind::Pong,
                seq: 7,
            })
            .await;

        assert_eq!(*log.lock(), vec!["pong:7"]);
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let dispatcher = EventDispatcher::<Event>::new();
        let invoked = dispatcher
            .dispatch(Event {
                kind: Kind::Ping,
                seq: 0,
            })
            .await;
        assert_eq!(invoked, 0);
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_registration_during_dispatch_applies_to_next_event() {
        let dispatcher = Arc::new(EventDispatcher::<Event>::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_dispatcher = dispatcher.clone();
        let inner_log = log.clone();
        dispatcher.subscribe(
            Kind::Ping,
            Arc::new(move |event: Event| {
                let dispatcher = inner_dispatcher.clone();
                let log = inner_log.clone();
                Box::pin(async move {
                    log.lock().push(format!("outer:{}", event.seq));
                    if event.seq == 1 {
                        dispatcher.subscribe(Kind::Ping, recorder(&log, "late"));
                    }
                }) as Pin<Box<dyn Future<Output = ()> + Send>>
            }),
        );

        dispatcher
            .dispatch(Event {
                kind: Kind::Ping,
                seq: 1,
            })
            .await;
        dispatcher
            .dispatch(Event {
                kind: Kind::Ping,
                seq: 2,
            })
            .await;

        assert_eq!(*log.lock(), vec!["outer:1", "outer:2", "late:2"]);
    }

    #[tokio::test]
    async fn test_clear_removes_all() {
        let dispatcher = EventDispatcher::<Event>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.subscribe(Kind::Ping, recorder(&log, "a"));
        dispatcher.subscribe(Kind::Pong, recorder(&log, "b"));
        assert_eq!(dispatcher.subscriber_count(Kind::Ping), 1);

        dispatcher.clear();
        assert!(dispatcher.is_empty());

        dispatcher
            .dispatch(Event {
                kind: Kind::Ping,
                seq: 3,
            })
            .await;
        assert!(log.lock().is_empty());
    }
}
