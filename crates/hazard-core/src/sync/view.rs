//! A view kept current from the change channel

use crate::models::{HazardReport, RecordChange, RecordId, RemoteRecord};

use super::broadcaster::Subscription;
use super::reconciler::{ApplyReport, LocalCollection, Reconciler, ViewSpec};

/// One view's collection plus its subscription to the change channel.
///
/// The collection is only ever mutated through this handle, by whichever task
/// owns it.
#[derive(Debug)]
pub struct LiveView {
    reconciler: Reconciler,
    collection: LocalCollection,
    subscription: Subscription,
}

impl LiveView {
    pub fn new(spec: ViewSpec, subscription: Subscription) -> Self {
        Self {
            reconciler: Reconciler::new(spec),
            collection: LocalCollection::new(),
            subscription,
        }
    }

    /// Replace the contents with a bulk query result.
    pub fn populate(&mut self, records: &[RemoteRecord]) -> ApplyReport {
        self.collection.clear();
        let changes: Vec<_> = records.iter().cloned().map(RecordChange::Created).collect();
        self.reconciler.apply(&changes, &mut self.collection)
    }

    /// Apply whatever has been published since the last call.
    pub fn apply_pending(&mut self) -> Option<ApplyReport> {
        let changes: Vec<_> = self
            .subscription
            .drain()
            .into_iter()
            .map(|event| event.change)
            .collect();
        if changes.is_empty() {
            return None;
        }
        Some(self.reconciler.apply(&changes, &mut self.collection))
    }

    /// Wait for at least one change, then apply everything queued.
    ///
    /// Returns `None` once the channel has been torn down.
    pub async fn next_batch(&mut self) -> Option<ApplyReport> {
        let first = self.subscription.recv().await?;
        let mut changes = vec![first.change];
        changes.extend(self.subscription.drain().into_iter().map(|event| event.change));
        Some(self.reconciler.apply(&changes, &mut self.collection))
    }

    pub const fn collection(&self) -> &LocalCollection {
        &self.collection
    }

    pub const fn spec(&self) -> &ViewSpec {
        self.reconciler.spec()
    }

    /// Reports in display order.
    pub fn reports(&self) -> Vec<&HazardReport> {
        self.collection.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn get(&self, record_id: &RecordId) -> Option<&HazardReport> {
        self.collection.get(record_id)
    }
}
