//! Hazard report model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::record::{RecordId, SystemFields};

/// Geographic position of a hazard, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Create a location, rejecting out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude {latitude} is outside -90..=90"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude {longitude} is outside -180..=180"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Photo payload attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo(Vec<u8>);

impl Photo {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Archived [`SystemFields`] carried by a report between edit cycles.
///
/// The report never interprets these bytes; the codec decodes them to address
/// the same remote record on the next save or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSystemFields(Vec<u8>);

impl EncodedSystemFields {
    pub fn encode(system: &SystemFields) -> Result<Self> {
        Ok(Self(serde_json::to_vec(system)?))
    }

    pub fn decode(&self) -> Result<SystemFields> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A hazard report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardReport {
    /// What the hazard is and where
    pub description: String,
    pub location: Option<Location>,
    pub photo: Option<Photo>,
    pub is_emergency: bool,
    pub is_resolved: bool,
    /// Creation timestamp (Unix ms), assigned by the store
    pub created_at: Option<i64>,
    /// Modification timestamp (Unix ms), assigned by the store
    pub modified_at: Option<i64>,
    /// Remote identity and change tag, present once saved
    pub system_fields: Option<EncodedSystemFields>,
}

impl HazardReport {
    /// Create an unsaved, unresolved report
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            location: None,
            photo: None,
            is_emergency: false,
            is_resolved: false,
            created_at: None,
            modified_at: None,
            system_fields: None,
        }
    }

    #[must_use]
    pub const fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_photo(mut self, photo: Photo) -> Self {
        self.photo = Some(photo);
        self
    }

    #[must_use]
    pub const fn with_emergency(mut self, is_emergency: bool) -> Self {
        self.is_emergency = is_emergency;
        self
    }

    /// Whether the store has saved this report at least once
    pub const fn is_saved(&self) -> bool {
        self.system_fields.is_some()
    }

    /// Remote identity, if saved and the archived system fields are readable
    pub fn record_id(&self) -> Option<RecordId> {
        let system = self.system_fields.as_ref()?.decode().ok()?;
        Some(system.record_id)
    }

    /// Get first line of the description, truncated to `max_len` characters
    #[must_use]
    pub fn summary(&self, max_len: usize) -> String {
        self.description
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Whether the user-editable fields match another report's.
    pub fn same_content(&self, other: &Self) -> bool {
        self.description == other.description
            && self.location == other.location
            && self.photo == other.photo
            && self.is_emergency == other.is_emergency
            && self.is_resolved == other.is_resolved
    }
}
