//! Change notifications and deltas

use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::{ChangeToken, RecordId, RemoteRecord};

/// Why the store reported a record in its change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// One entry of the store's change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub record_id: RecordId,
    pub reason: ChangeReason,
}

/// Notifications observed since a token, plus the token to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBatch {
    pub token: ChangeToken,
    pub notifications: Vec<ChangeNotification>,
}

/// One atomic observed change to a remote record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordChange {
    Created(RemoteRecord),
    Updated(RemoteRecord),
    Deleted(RecordId),
}

impl RecordChange {
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Self::Created(record) | Self::Updated(record) => record.record_id(),
            Self::Deleted(record_id) => Some(record_id),
        }
    }

    pub const fn reason(&self) -> ChangeReason {
        match self {
            Self::Created(_) => ChangeReason::Created,
            Self::Updated(_) => ChangeReason::Updated,
            Self::Deleted(_) => ChangeReason::Deleted,
        }
    }
}

/// Where a change was first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Confirmed local save/delete.
    Local,
    /// Pulled from the store's change stream.
    Remote,
}

/// A change as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub origin: ChangeOrigin,
    pub change: RecordChange,
}

impl ChangeEvent {
    #[must_use]
    pub const fn local(change: RecordChange) -> Self {
        Self {
            origin: ChangeOrigin::Local,
            change,
        }
    }

    #[must_use]
    pub const fn remote(change: RecordChange) -> Self {
        Self {
            origin: ChangeOrigin::Remote,
            change,
        }
    }
}
