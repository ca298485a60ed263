//! Remote record store contract
//!
//! The authoritative store lives outside this crate. [`RemoteStore`] is the
//! surface the sync core consumes; [`MemoryRemoteStore`] implements it
//! in-process for tests and local development.

mod memory;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use memory::{MemoryRemoteStore, StoreOperation, StoreSnapshot};

use crate::error::Result;
use crate::models::{
    ChangeReason, ChangeToken, FieldValue, NotificationBatch, RecordId, RemoteRecord,
};

/// Server-side predicate for queries and subscriptions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFilter {
    /// Every record of the type.
    #[default]
    All,
    /// Records whose field equals the value.
    FieldEquals { field: String, value: FieldValue },
}

impl RecordFilter {
    pub fn matches(&self, record: &RemoteRecord) -> bool {
        match self {
            Self::All => true,
            Self::FieldEquals { field, value } => record.get(field) == Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CreatedAt,
    ModifiedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub key: SortKey,
    pub ascending: bool,
}

/// Bulk query used to populate a view before incremental sync takes over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub record_type: String,
    pub filter: RecordFilter,
    pub sort: Vec<SortDescriptor>,
}

impl RecordQuery {
    #[must_use]
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            filter: RecordFilter::All,
            sort: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn sort_by(mut self, key: SortKey, ascending: bool) -> Self {
        self.sort.push(SortDescriptor { key, ascending });
        self
    }
}

/// Standing registration that makes the store emit change notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySubscription {
    pub subscription_id: String,
    pub record_type: String,
    pub filter: RecordFilter,
    pub fires_on: Vec<ChangeReason>,
}

impl QuerySubscription {
    /// Subscribe to creations, updates, and deletions of every record of a type.
    #[must_use]
    pub fn all_changes(subscription_id: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            record_type: record_type.into(),
            filter: RecordFilter::All,
            fires_on: vec![
                ChangeReason::Created,
                ChangeReason::Updated,
                ChangeReason::Deleted,
            ],
        }
    }

    pub fn fires_for(&self, record: &RemoteRecord, reason: ChangeReason) -> bool {
        self.record_type == record.record_type
            && self.fires_on.contains(&reason)
            && self.filter.matches(record)
    }
}

/// Operations the sync core needs from the authoritative record store.
///
/// Every call may suspend on network I/O. Transport problems surface as
/// [`crate::Error::Transport`] and leave the store unchanged.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Bulk fetch for initial view population.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<RemoteRecord>>;

    /// Notifications observed since `since` (all retained ones when `None`).
    ///
    /// Fails with [`crate::Error::InvalidChangeToken`] when the token is no
    /// longer accepted.
    async fn fetch_change_notifications(
        &self,
        since: Option<&ChangeToken>,
    ) -> Result<NotificationBatch>;

    /// Fetch records by identity in one round trip. Unknown ids are omitted.
    async fn fetch_records(&self, ids: &[RecordId]) -> Result<HashMap<RecordId, RemoteRecord>>;

    /// Save a record; fails with [`crate::Error::VersionConflict`] on a stale change tag.
    async fn save(&self, record: &RemoteRecord) -> Result<RemoteRecord>;

    /// Delete a record; fails with [`crate::Error::NotFound`] when absent.
    async fn delete(&self, record_id: &RecordId) -> Result<RecordId>;

    /// Register a standing query subscription.
    async fn subscribe(&self, subscription: &QuerySubscription) -> Result<()>;
}
