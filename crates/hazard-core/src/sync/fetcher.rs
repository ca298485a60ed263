//! Delta fetching
//!
//! One fetch costs at most two round trips regardless of how many records
//! changed: one for the notification list and one batched record fetch.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{ChangeReason, ChangeToken, RecordChange, RecordId};
use crate::remote::RemoteStore;

/// Deltas observed since a token, plus the token to store once they are delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedChanges {
    pub token: ChangeToken,
    pub changes: Vec<RecordChange>,
}

/// Pulls and classifies the remote change stream for one record type.
#[derive(Debug, Clone)]
pub struct DeltaFetcher {
    record_type: String,
}

impl DeltaFetcher {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
        }
    }

    /// Fetch every delta since `token`.
    ///
    /// Nothing is returned unless the whole cycle succeeds, so a failed fetch
    /// can be retried later with the same token. A token the store no longer
    /// accepts is dropped and the fetch restarts from the beginning.
    pub async fn fetch<S: RemoteStore>(
        &self,
        store: &S,
        token: Option<&ChangeToken>,
    ) -> Result<FetchedChanges> {
        match self.fetch_since(store, token).await {
            Err(Error::InvalidChangeToken) if token.is_some() => {
                tracing::warn!("Remote store rejected the change token; resyncing from scratch");
                self.fetch_since(store, None).await
            }
            result => result,
        }
    }

    async fn fetch_since<S: RemoteStore>(
        &self,
        store: &S,
        token: Option<&ChangeToken>,
    ) -> Result<FetchedChanges> {
        let batch = store.fetch_change_notifications(token).await?;

        // Collapse repeated notifications for one record into a single reason.
        let mut order: Vec<RecordId> = Vec::new();
        let mut reasons: HashMap<RecordId, ChangeReason> = HashMap::new();
        for notification in batch.notifications {
            let merged = match reasons.get(&notification.record_id) {
                None => {
                    order.push(notification.record_id.clone());
                    notification.reason
                }
                Some(previous) => merge_reason(*previous, notification.reason),
            };
            reasons.insert(notification.record_id, merged);
        }

        let to_fetch: Vec<RecordId> = order
            .iter()
            .filter(|id| reasons.get(*id) != Some(&ChangeReason::Deleted))
            .cloned()
            .collect();
        let mut fetched = if to_fetch.is_empty() {
            HashMap::new()
        } else {
            store.fetch_records(&to_fetch).await?
        };

        if let Some(foreign) = fetched
            .values()
            .find(|record| record.record_type != self.record_type)
        {
            return Err(Error::RecordTypeMismatch {
                expected: self.record_type.clone(),
                found: foreign.record_type.clone(),
            });
        }

        let mut changes = Vec::with_capacity(order.len());
        for record_id in &order {
            match reasons.get(record_id) {
                Some(ChangeReason::Deleted) => {
                    changes.push(RecordChange::Deleted(record_id.clone()));
                }
                Some(reason) => match fetched.remove(record_id) {
                    Some(record) if *reason == ChangeReason::Created => {
                        changes.push(RecordChange::Created(record));
                    }
                    Some(record) => changes.push(RecordChange::Updated(record)),
                    None => tracing::debug!(
                        "Record {record_id} vanished before it could be fetched; its deletion arrives next cycle"
                    ),
                },
                None => {}
            }
        }

        // Records returned without a cached reason are treated as updates.
        let mut unexpected: Vec<_> = fetched.into_iter().collect();
        unexpected.sort_by(|left, right| left.0.cmp(&right.0));
        for (record_id, record) in unexpected {
            tracing::debug!("Record {record_id} fetched without a notification; treating as update");
            changes.push(RecordChange::Updated(record));
        }

        tracing::debug!(
            "Fetched {} change(s) from {} notification(s)",
            changes.len(),
            order.len()
        );
        Ok(FetchedChanges {
            token: batch.token,
            changes,
        })
    }
}

/// A record created and then edited within one batch is still new to us.
const fn merge_reason(previous: ChangeReason, next: ChangeReason) -> ChangeReason {
    match (previous, next) {
        (ChangeReason::Created, ChangeReason::Updated) => ChangeReason::Created,
        (_, next) => next,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::models::{ChangeNotification, FieldValue, NotificationBatch, RemoteRecord, SystemFields};
    use crate::remote::{MemoryRemoteStore, QuerySubscription, RecordQuery, StoreOperation};
    use pretty_assertions::assert_eq;

    fn record(id: &str, record_type: &str) -> RemoteRecord {
        let mut record = RemoteRecord::with_system_fields(SystemFields {
            record_id: RecordId::from(id),
            record_type: record_type.to_string(),
            change_tag: 1,
            created_at: 1,
            modified_at: 1,
        });
        record.set("description", FieldValue::Text(format!("report {id}")));
        record
    }

    fn notification(id: &str, reason: ChangeReason) -> ChangeNotification {
        ChangeNotification {
            record_id: RecordId::from(id),
            reason,
        }
    }

    /// Store double that replays canned responses and records requested ids.
    #[derive(Default)]
    struct ScriptedStore {
        batches: RefCell<VecDeque<Result<NotificationBatch>>>,
        records: HashMap<RecordId, RemoteRecord>,
        requested: RefCell<Vec<Vec<RecordId>>>,
    }

    impl ScriptedStore {
        fn with_batch(notifications: Vec<ChangeNotification>) -> Self {
            let store = Self::default();
            store.batches.borrow_mut().push_back(Ok(NotificationBatch {
                token: ChangeToken::from_bytes(b"next".to_vec()),
                notifications,
            }));
            store
        }

        fn with_record(mut self, record: RemoteRecord) -> Self {
            self.records
                .insert(record.record_id().unwrap().clone(), record);
            self
        }
    }

    impl RemoteStore for ScriptedStore {
        async fn query(&self, _query: &RecordQuery) -> Result<Vec<RemoteRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_change_notifications(
            &self,
            _since: Option<&ChangeToken>,
        ) -> Result<NotificationBatch> {
            self.batches
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("no scripted batch".to_string())))
        }

        async fn fetch_records(
            &self,
            ids: &[RecordId],
        ) -> Result<HashMap<RecordId, RemoteRecord>> {
            self.requested.borrow_mut().push(ids.to_vec());
            Ok(self.records.clone())
        }

        async fn save(&self, record: &RemoteRecord) -> Result<RemoteRecord> {
            Ok(record.clone())
        }

        async fn delete(&self, record_id: &RecordId) -> Result<RecordId> {
            Ok(record_id.clone())
        }

        async fn subscribe(&self, _subscription: &QuerySubscription) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn classifies_notifications_in_order() {
        let store = ScriptedStore::with_batch(vec![
            notification("a", ChangeReason::Created),
            notification("b", ChangeReason::Deleted),
            notification("c", ChangeReason::Updated),
        ])
        .with_record(record("a", "HazardReport"))
        .with_record(record("c", "HazardReport"));

        let fetched = DeltaFetcher::new("HazardReport")
            .fetch(&store, None)
            .await
            .unwrap();

        assert_eq!(fetched.token, ChangeToken::from_bytes(b"next".to_vec()));
        assert_eq!(
            fetched.changes,
            vec![
                RecordChange::Created(record("a", "HazardReport")),
                RecordChange::Deleted(RecordId::from("b")),
                RecordChange::Updated(record("c", "HazardReport")),
            ]
        );
        // Deleted ids are never fetched, the rest go in one request.
        assert_eq!(
            *store.requested.borrow(),
            vec![vec![RecordId::from("a"), RecordId::from("c")]]
        );
    }

    #[tokio::test]
    async fn notification_storm_for_one_record_collapses() {
        let store = ScriptedStore::with_batch(vec![
            notification("a", ChangeReason::Created),
            notification("a", ChangeReason::Updated),
            notification("a", ChangeReason::Updated),
        ])
        .with_record(record("a", "HazardReport"));

        let fetched = DeltaFetcher::new("HazardReport")
            .fetch(&store, None)
            .await
            .unwrap();

        assert_eq!(
            fetched.changes,
            vec![RecordChange::Created(record("a", "HazardReport"))]
        );
        assert_eq!(store.requested.borrow().len(), 1);
    }

    #[tokio::test]
    async fn deletion_after_creation_wins() {
        let store = ScriptedStore::with_batch(vec![
            notification("a", ChangeReason::Created),
            notification("a", ChangeReason::Deleted),
        ]);

        let fetched = DeltaFetcher::new("HazardReport")
            .fetch(&store, None)
            .await
            .unwrap();

        assert_eq!(
            fetched.changes,
            vec![RecordChange::Deleted(RecordId::from("a"))]
        );
        assert!(store.requested.borrow().is_empty());
    }

    #[tokio::test]
    async fn record_without_cached_reason_is_an_update() {
        let store = ScriptedStore::with_batch(vec![notification("a", ChangeReason::Created)])
            .with_record(record("a", "HazardReport"))
            .with_record(record("z", "HazardReport"));

        let fetched = DeltaFetcher::new("HazardReport")
            .fetch(&store, None)
            .await
            .unwrap();

        assert_eq!(
            fetched.changes,
            vec![
                RecordChange::Created(record("a", "HazardReport")),
                RecordChange::Updated(record("z", "HazardReport")),
            ]
        );
    }

    #[tokio::test]
    async fn vanished_record_is_skipped() {
        let store = ScriptedStore::with_batch(vec![notification("gone", ChangeReason::Updated)]);

        let fetched = DeltaFetcher::new("HazardReport")
            .fetch(&store, None)
            .await
            .unwrap();
        assert!(fetched.changes.is_empty());
    }

    #[tokio::test]
    async fn foreign_record_type_is_a_hard_stop() {
        let store = ScriptedStore::with_batch(vec![notification("a", ChangeReason::Updated)])
            .with_record(record("a", "Note"));

        let error = DeltaFetcher::new("HazardReport")
            .fetch(&store, None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::RecordTypeMismatch { .. }));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn rejected_token_restarts_from_scratch() {
        let store = ScriptedStore::with_batch(vec![notification("a", ChangeReason::Deleted)]);
        store
            .batches
            .borrow_mut()
            .push_front(Err(Error::InvalidChangeToken));

        let stale = ChangeToken::from_bytes(b"stale".to_vec());
        let fetched = DeltaFetcher::new("HazardReport")
            .fetch(&store, Some(&stale))
            .await
            .unwrap();

        assert_eq!(
            fetched.changes,
            vec![RecordChange::Deleted(RecordId::from("a"))]
        );
    }

    #[tokio::test]
    async fn record_fetch_failure_returns_nothing() {
        let store = MemoryRemoteStore::new();
        store
            .subscribe(&QuerySubscription::all_changes("all", "HazardReport"))
            .await
            .unwrap();
        let mut draft = RemoteRecord::new("HazardReport");
        draft.set("description", FieldValue::Text("Leak".to_string()));
        store.save(&draft).await.unwrap();

        store.fail_next(StoreOperation::FetchRecords).unwrap();
        let fetcher = DeltaFetcher::new("HazardReport");
        assert!(matches!(
            fetcher.fetch(&store, None).await,
            Err(Error::Transport(_))
        ));

        // Same token, same result once the transport recovers.
        let fetched = fetcher.fetch(&store, None).await.unwrap();
        assert_eq!(fetched.changes.len(), 1);
        assert_eq!(store.call_count(StoreOperation::FetchNotifications), 2);
        assert_eq!(store.call_count(StoreOperation::FetchRecords), 2);
    }
}
