//! # Event bus.
//!
//! [`Bus`] delivers every published [`Event`] in two stages:
//!
//! 1. **Synchronously**, in registration order, to every [`Listen`] implementor
//!    (on the publishing task, before `publish` returns). Consumers that must see
//!    state right after a transition (conflict detection, tests, UI models)
//!    register here.
//! 2. **Asynchronously**, through a [`tokio::sync::broadcast`] channel, to
//!    receivers obtained from [`Bus::subscribe`] (the subscriber fan-out).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                Listeners (sync, ordered)
//!   Store        ──┐          ┌──► Listen #1 ──► Listen #2 ──► ...
//!   Coordinator  ──┼──► Bus ──┤
//!   Relay        ──┘          └──► broadcast ──► subscriber listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - A panicking listener is isolated (logged) and does not stop delivery.
//! - Listeners may publish; the listener list is snapshotted before delivery.
//! - Broadcast receivers that lag observe `RecvError::Lagged(n)`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::event::Event;

/// Synchronous event listener.
pub trait Listen: Send + Sync + 'static {
    /// Handles one event. Must not block.
    fn on_event(&self, event: &Event);
}

impl<F> Listen for F
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Event bus with ordered synchronous listeners and a broadcast tail.
///
/// Cheap to clone (shared internals).
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    listeners: Arc<RwLock<Vec<Arc<dyn Listen>>>>,
}

impl Bus {
    /// Creates a new bus with the given broadcast capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self {
            tx,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a synchronous listener.
    pub fn listen(&self, listener: Arc<dyn Listen>) {
        self.listeners.write().push(listener);
    }

    /// Removes a listener previously passed to [`Bus::listen`] (compared by identity).
    pub fn unlisten(&self, listener: &Arc<dyn Listen>) {
        self.listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Publishes an event: listeners first (in order), then the broadcast channel.
    pub fn publish(&self, ev: Event) {
        let listeners: Vec<Arc<dyn Listen>> = self.listeners.read().clone();
        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(&ev))).is_err() {
                tracing::warn!(kind = ?ev.kind, seq = ev.seq, "event listener panicked");
            }
        }
        let _ = self.tx.send(ev);
    }

    /// Creates a new broadcast receiver that observes subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use parking_lot::Mutex;

    #[test]
    fn listeners_see_events_in_order_before_publish_returns() {
        let bus = Bus::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        bus.listen(Arc::new(move |ev: &Event| first.lock().push(("first", ev.kind))));
        bus.listen(Arc::new(move |ev: &Event| second.lock().push(("second", ev.kind))));

        bus.publish(Event::new(EventKind::RecordAdded));
        bus.publish(Event::new(EventKind::SelectionChanged));

        assert_eq!(
            *seen.lock(),
            vec![
                ("first", EventKind::RecordAdded),
                ("second", EventKind::RecordAdded),
                ("first", EventKind::SelectionChanged),
                ("second", EventKind::SelectionChanged),
            ]
        );
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let bus = Bus::new(8);
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        bus.listen(Arc::new(|_: &Event| panic!("boom")));
        bus.listen(Arc::new(move |_: &Event| *c.lock() += 1));

        bus.publish(Event::new(EventKind::RecordAdded));
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn unlisten_by_identity() {
        let bus = Bus::new(8);
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let l: Arc<dyn Listen> = Arc::new(move |_: &Event| *c.lock() += 1);
        bus.listen(Arc::clone(&l));
        bus.publish(Event::new(EventKind::RecordAdded));
        bus.unlisten(&l);
        bus.publish(Event::new(EventKind::RecordAdded));
        assert_eq!(*count.lock(), 1);
    }

    #[tokio::test]
    async fn broadcast_receives_after_listeners() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::StateLoaded).with_reason("first"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::StateLoaded);
        assert_eq!(ev.reason.as_deref(), Some("first"));
    }
}
