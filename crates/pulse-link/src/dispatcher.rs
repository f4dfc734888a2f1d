use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use pulse_core::Event;
use tracing::error;

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Synchronous fan-out of events to registered listeners.
///
/// `notify` calls listeners in registration order on the caller's thread.
/// A listener that panics is logged and skipped; the rest still run.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    panics: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_listener<F>(self: &Arc<Self>, listener: F) -> ListenerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            dispatcher: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener registered when the call starts.
    /// Listeners added or removed during delivery take effect on the next
    /// call.
    pub fn notify(&self, event: &Event) {
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners.read().clone();
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                self.panics.fetch_add(1, Ordering::Relaxed);
                error!(
                    listener = id.0,
                    service = %event.service,
                    event_type = event.event_type(),
                    "listener panicked, continuing delivery"
                );
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of listener panics caught so far.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

/// Returned by [`EventDispatcher::add_listener`]. Dropping the handle does
/// not unsubscribe; call [`ListenerHandle::unsubscribe`].
#[derive(Debug)]
pub struct ListenerHandle {
    id: ListenerId,
    dispatcher: Weak<EventDispatcher>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Returns false if it was already gone or the
    /// dispatcher no longer exists.
    pub fn unsubscribe(self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|dispatcher| dispatcher.remove(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pulse_core::{ConnectionStatus, ServiceName};

    fn connected(service: &str) -> Event {
        Event::connection(
            ServiceName::from(service),
            ConnectionStatus::Connected,
            None,
            None,
        )
    }

    #[test]
    fn delivers_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            dispatcher.add_listener(move |_| seen.lock().push(tag));
        }
        dispatcher.notify(&connected("claude"));
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let handle = dispatcher.add_listener(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        dispatcher.notify(&connected("claude"));
        assert!(handle.unsubscribe());
        dispatcher.notify(&connected("claude"));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        dispatcher.add_listener(|_| panic!("boom"));
        let h = Arc::clone(&hits);
        dispatcher.add_listener(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });

        dispatcher.notify(&connected("claude"));
        dispatcher.notify(&connected("codex"));

        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(dispatcher.panic_count(), 2);
    }

    #[test]
    fn listener_added_during_notify_waits_for_next_event() {
        let dispatcher = EventDispatcher::new();
        let late_hits = Arc::new(AtomicU64::new(0));
        let d = Arc::clone(&dispatcher);
        let late = Arc::clone(&late_hits);
        dispatcher.add_listener(move |_| {
            let late = Arc::clone(&late);
            d.add_listener(move |_| {
                late.fetch_add(1, Ordering::Relaxed);
            });
        });

        dispatcher.notify(&connected("claude"));
        assert_eq!(late_hits.load(Ordering::Relaxed), 0);
        assert_eq!(dispatcher.listener_count(), 2);

        dispatcher.notify(&connected("claude"));
        assert_eq!(late_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unsubscribing_mid_dispatch_does_not_skip_others() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        let victim: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        let v = Arc::clone(&victim);
        dispatcher.add_listener(move |_| {
            if let Some(handle) = v.lock().take() {
                handle.unsubscribe();
            }
        });
        let h = Arc::clone(&hits);
        *victim.lock() = Some(dispatcher.add_listener(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        }));

        dispatcher.notify(&connected("claude"));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        dispatcher.notify(&connected("claude"));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn unsubscribe_after_dispatcher_dropped() {
        let dispatcher = EventDispatcher::new();
        let handle = dispatcher.add_listener(|_| {});
        drop(dispatcher);
        assert!(!handle.unsubscribe());
    }
}
