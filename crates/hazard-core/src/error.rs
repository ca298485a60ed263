//! Error types for hazard-core

use thiserror::Error;

use crate::models::RecordId;

/// Result type alias using hazard-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hazard-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote store unreachable or the request failed in transit
    #[error("Transport error: {0}")]
    Transport(String),

    /// Save presented a stale change tag
    #[error("Version conflict on record {record_id}: server is at change tag {server_change_tag}")]
    VersionConflict {
        record_id: RecordId,
        server_change_tag: u64,
    },

    /// Remote record is missing a required field or carries the wrong type
    #[error("Failed to decode record {record_id}: {reason}")]
    Decode { record_id: String, reason: String },

    /// Change token storage unavailable
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Remote store no longer accepts the presented change token
    #[error("Change token rejected by remote store")]
    InvalidChangeToken,

    /// A record id resolved to a record of another type
    #[error("Record type mismatch: expected {expected}, found {found}")]
    RecordTypeMismatch { expected: String, found: String },

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation later can succeed without caller changes.
    ///
    /// Version conflicts count as retryable: the caller re-fetches, then re-saves.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::VersionConflict { .. }
                | Self::InvalidChangeToken
                | Self::Persistence(_)
        )
    }
}
