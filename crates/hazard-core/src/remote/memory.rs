//! In-process remote store
//!
//! Behaves like the hosted backend where the sync core can observe it:
//! store-assigned ids, change tags checked on save, a change log exposed
//! through resumable tokens, and notifications only for changes that match a
//! registered subscription. Clones share one backend, so two clones act as
//! two devices.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{QuerySubscription, RecordQuery, RemoteStore, SortKey};
use crate::error::{Error, Result};
use crate::models::{
    Asset, ChangeNotification, ChangeReason, ChangeToken, FieldValue, NotificationBatch, RecordId,
    RemoteRecord, SystemFields,
};
use crate::util::unix_millis_now;

/// Store operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Query,
    FetchNotifications,
    FetchRecords,
    Save,
    Delete,
    Subscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LogEntry {
    seq: u64,
    record_id: RecordId,
    reason: ChangeReason,
}

/// Serializable backend contents.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    records: BTreeMap<RecordId, RemoteRecord>,
    log: Vec<LogEntry>,
    next_seq: u64,
    /// Tokens below this sequence number are rejected.
    purged_before: u64,
    last_timestamp: i64,
    subscriptions: Vec<QuerySubscription>,
}

#[derive(Debug, Default)]
struct StoreState {
    data: StoreSnapshot,
    pending_faults: Vec<StoreOperation>,
    calls: HashMap<StoreOperation, usize>,
}

impl StoreState {
    fn begin(&mut self, operation: StoreOperation) -> Result<()> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some(index) = self
            .pending_faults
            .iter()
            .position(|pending| *pending == operation)
        {
            self.pending_faults.remove(index);
            return Err(Error::Transport(format!(
                "simulated {operation:?} failure"
            )));
        }
        Ok(())
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = unix_millis_now().max(self.data.last_timestamp + 1);
        self.data.last_timestamp = now;
        now
    }

    fn record_change(&mut self, record: &RemoteRecord, reason: ChangeReason) {
        let Some(record_id) = record.record_id().cloned() else {
            return;
        };
        let notify = self
            .data
            .subscriptions
            .iter()
            .any(|subscription| subscription.fires_for(record, reason));
        if !notify {
            return;
        }
        let seq = self.data.next_seq;
        self.data.next_seq += 1;
        self.data.log.push(LogEntry {
            seq,
            record_id,
            reason,
        });
    }

    fn resolve_token(&self, token: Option<&ChangeToken>) -> Result<u64> {
        let Some(token) = token else {
            return Ok(self.data.purged_before);
        };
        let seq = std::str::from_utf8(token.as_bytes())
            .ok()
            .and_then(|text| text.parse::<u64>().ok())
            .ok_or(Error::InvalidChangeToken)?;
        if seq < self.data.purged_before || seq > self.data.next_seq {
            return Err(Error::InvalidChangeToken);
        }
        Ok(seq)
    }
}

/// In-process [`RemoteStore`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a backend from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                data: snapshot,
                ..StoreState::default()
            })),
        }
    }

    /// Copy the backend contents for persistence.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(self.lock()?.data.clone())
    }

    /// Make the next call of `operation` fail with a transport error.
    pub fn fail_next(&self, operation: StoreOperation) -> Result<()> {
        self.lock()?.pending_faults.push(operation);
        Ok(())
    }

    /// Number of calls made to `operation`, including failed ones.
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.lock()
            .map(|state| state.calls.get(&operation).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Registered subscriptions.
    pub fn subscriptions(&self) -> Result<Vec<QuerySubscription>> {
        Ok(self.lock()?.data.subscriptions.clone())
    }

    /// Number of records currently stored.
    pub fn record_count(&self) -> usize {
        self.lock()
            .map(|state| state.data.records.len())
            .unwrap_or_default()
    }

    /// Drop retained notifications; tokens issued before now become invalid.
    pub fn purge_notifications(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.data.log.clear();
        state.data.purged_before = state.data.next_seq;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| Error::Transport("remote store state poisoned".to_string()))
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<RemoteRecord>> {
        let mut state = self.lock()?;
        state.begin(StoreOperation::Query)?;

        let mut records: Vec<RemoteRecord> = state
            .data
            .records
            .values()
            .filter(|record| record.record_type == query.record_type)
            .filter(|record| query.filter.matches(record))
            .cloned()
            .collect();

        for descriptor in query.sort.iter().rev() {
            records.sort_by(|left, right| {
                let ordering = match descriptor.key {
                    SortKey::CreatedAt => left.created_at().cmp(&right.created_at()),
                    SortKey::ModifiedAt => left.modified_at().cmp(&right.modified_at()),
                };
                if descriptor.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        Ok(records)
    }

    async fn fetch_change_notifications(
        &self,
        since: Option<&ChangeToken>,
    ) -> Result<NotificationBatch> {
        let mut state = self.lock()?;
        state.begin(StoreOperation::FetchNotifications)?;

        let start = state.resolve_token(since)?;
        let notifications = state
            .data
            .log
            .iter()
            .filter(|entry| entry.seq >= start)
            .map(|entry| ChangeNotification {
                record_id: entry.record_id.clone(),
                reason: entry.reason,
            })
            .collect();

        Ok(NotificationBatch {
            token: ChangeToken::from_bytes(state.data.next_seq.to_string()),
            notifications,
        })
    }

    async fn fetch_records(&self, ids: &[RecordId]) -> Result<HashMap<RecordId, RemoteRecord>> {
        let mut state = self.lock()?;
        state.begin(StoreOperation::FetchRecords)?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .data
                    .records
                    .get(id)
                    .map(|record| (id.clone(), record.clone()))
            })
            .collect())
    }

    async fn save(&self, record: &RemoteRecord) -> Result<RemoteRecord> {
        let mut state = self.lock()?;
        state.begin(StoreOperation::Save)?;

        if record.record_type.trim().is_empty() {
            return Err(Error::InvalidInput(
                "record type cannot be empty".to_string(),
            ));
        }

        let mut stored = record.clone();
        for value in stored.fields.values_mut() {
            if let FieldValue::Asset(asset @ Asset::File(_)) = value {
                let bytes = asset.read_bytes()?;
                *asset = Asset::Bytes(bytes);
            }
        }

        let now = state.next_timestamp();
        let reason = match &record.system {
            None => {
                stored.system = Some(SystemFields {
                    record_id: RecordId::new(Uuid::now_v7().to_string()),
                    record_type: record.record_type.clone(),
                    change_tag: 1,
                    created_at: now,
                    modified_at: now,
                });
                ChangeReason::Created
            }
            Some(system) => {
                let existing = state
                    .data
                    .records
                    .get(&system.record_id)
                    .ok_or_else(|| Error::NotFound(system.record_id.to_string()))?;
                let server_change_tag = existing.change_tag().unwrap_or_default();
                if server_change_tag != system.change_tag {
                    return Err(Error::VersionConflict {
                        record_id: system.record_id.clone(),
                        server_change_tag,
                    });
                }
                stored.system = Some(SystemFields {
                    record_id: system.record_id.clone(),
                    record_type: existing.record_type.clone(),
                    change_tag: server_change_tag + 1,
                    created_at: existing.created_at().unwrap_or(now),
                    modified_at: now,
                });
                ChangeReason::Updated
            }
        };

        let record_id = stored
            .record_id()
            .cloned()
            .ok_or_else(|| Error::InvalidInput("saved record has no identity".to_string()))?;
        state.data.records.insert(record_id, stored.clone());
        state.record_change(&stored, reason);
        Ok(stored)
    }

    async fn delete(&self, record_id: &RecordId) -> Result<RecordId> {
        let mut state = self.lock()?;
        state.begin(StoreOperation::Delete)?;

        let removed = state
            .data
            .records
            .remove(record_id)
            .ok_or_else(|| Error::NotFound(record_id.to_string()))?;
        state.record_change(&removed, ChangeReason::Deleted);
        Ok(record_id.clone())
    }

    async fn subscribe(&self, subscription: &QuerySubscription) -> Result<()> {
        let mut state = self.lock()?;
        state.begin(StoreOperation::Subscribe)?;

        state
            .data
            .subscriptions
            .retain(|existing| existing.subscription_id != subscription.subscription_id);
        state.data.subscriptions.push(subscription.clone());
        Ok(())
    }
}
