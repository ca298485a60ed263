//! In-process change channel
//!
//! Every subscriber gets its own unbounded queue, so a slow view never makes
//! another one miss a change and each subscriber sees changes in publish
//! order. Nothing is deduplicated here; reconciling is idempotent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::models::{ChangeEvent, ChangeOrigin, RecordChange};

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<ChangeEvent>)>,
    closed: bool,
}

/// Fan-out of local and remote changes to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct ChangeBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dropping the handle unsubscribes it.
    ///
    /// Subscribing after [`close`](Self::close) yields a handle that never
    /// receives anything.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        if !registry.closed {
            registry.subscribers.push((id, sender));
        }
        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver one event to every subscriber; returns how many received it.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let mut registry = self.lock();
        registry
            .subscribers
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
        registry.subscribers.len()
    }

    /// Deliver a batch in order, as one publish per change.
    pub fn publish_batch(&self, origin: ChangeOrigin, changes: Vec<RecordChange>) -> usize {
        let count = changes.len();
        let mut delivered = 0;
        for change in changes {
            delivered = self.publish(&ChangeEvent { origin, change });
        }
        tracing::debug!("Published {count} {origin:?} change(s) to {delivered} subscriber(s)");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Drop every subscriber. Their pending events can still be drained.
    pub fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.subscribers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // The registry holds no invariant a panicking publisher could break.
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A subscriber's handle on the change channel.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Wait for the next event; `None` once the broadcaster is closed and drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Every event queued so far.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
