//! Remote record model
//!
//! A [`RemoteRecord`] is the store-side shape of a hazard report: a loosely
//! typed field map plus the system fields the store assigns on save.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Store-assigned record identity, unique within a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Metadata owned by the remote store.
///
/// `change_tag` is the concurrency token: the store bumps it on every save and
/// rejects saves that present an older value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFields {
    pub record_id: RecordId,
    pub record_type: String,
    pub change_tag: u64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last modification timestamp (Unix ms)
    pub modified_at: i64,
}

/// Large binary payload carried out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// Staged file awaiting upload.
    File(PathBuf),
    /// Bytes the store has already ingested.
    Bytes(Vec<u8>),
}

impl Asset {
    /// Read the asset payload, loading it from disk for staged files.
    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::File(path) => std::fs::read(path),
            Self::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// A single typed field value on a remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Location { latitude: f64, longitude: f64 },
    Asset(Asset),
}

impl FieldValue {
    /// Short type name used in diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::Location { .. } => "location",
            Self::Asset(_) => "asset",
        }
    }
}

/// Store-side record representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_type: String,
    /// `None` until the store has saved the record once.
    pub system: Option<SystemFields>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RemoteRecord {
    /// Create an unsaved record with no identity.
    #[must_use]
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            system: None,
            fields: BTreeMap::new(),
        }
    }

    /// Create a record bound to existing system fields.
    #[must_use]
    pub fn with_system_fields(system: SystemFields) -> Self {
        Self {
            record_type: system.record_type.clone(),
            system: Some(system),
            fields: BTreeMap::new(),
        }
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.system.as_ref().map(|system| &system.record_id)
    }

    pub fn change_tag(&self) -> Option<u64> {
        self.system.as_ref().map(|system| system.change_tag)
    }

    pub fn created_at(&self) -> Option<i64> {
        self.system.as_ref().map(|system| system.created_at)
    }

    pub fn modified_at(&self) -> Option<i64> {
        self.system.as_ref().map(|system| system.modified_at)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    /// Identity used in diagnostics, `<unsaved>` for records without one.
    pub fn display_id(&self) -> String {
        self.record_id()
            .map_or_else(|| "<unsaved>".to_string(), ToString::to_string)
    }
}

/// Opaque cursor into the remote change stream.
///
/// Ordering between tokens is known only to the store; the client stores and
/// presents them without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(Vec<u8>);

impl ChangeToken {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}
