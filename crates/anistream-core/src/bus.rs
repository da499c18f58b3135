//! Typed in-process event bus
//!
//! Each topic is its own `EventBus<E>`. Subscribers hold a
//! [`Subscription`] and stop receiving as soon as it is dropped, so a
//! listener can never outlive the component that registered it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;

type Listeners<E> = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<E>>>>;

/// Publish/subscribe channel for one event type
pub struct EventBus<E> {
    listeners: Listeners<E>,
    next_id: Arc<AtomicU64>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

fn lock<E>(listeners: &Listeners<E>) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<E>>> {
    listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&self) -> Subscription<E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).insert(id, tx);
        trace!(id, "Listener subscribed");
        Subscription {
            id,
            rx,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Deliver an event to every live listener, returning how many got it
    pub fn publish(&self, event: E) -> usize {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

/// Handle of one listener; dropping it unsubscribes
pub struct Subscription<E> {
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
    listeners: Listeners<E>,
}

impl<E> Subscription<E> {
    /// Next pending event without waiting
    pub fn try_next(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take everything queued so far
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        lock(&self.listeners).remove(&self.id);
        trace!(id = self.id, "Listener unsubscribed");
    }
}

impl<E> std::fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Topic {
        ResetFilters,
        Search(String),
    }

    #[test]
    fn test_fan_out() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(Topic::ResetFilters), 2);
        assert_eq!(a.try_next(), Some(Topic::ResetFilters));
        assert_eq!(b.try_next(), Some(Topic::ResetFilters));
        assert_eq!(a.try_next(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        let clone = bus.clone();
        assert_eq!(clone.listener_count(), 1);
        drop(sub);
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.publish(Topic::Search("x".into())), 0);
    }

    #[tokio::test]
    async fn test_async_next() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(Topic::Search("naruto".into()));
        assert_eq!(sub.next().await, Some(Topic::Search("naruto".into())));
    }
}
