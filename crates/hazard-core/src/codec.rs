//! Conversion between [`HazardReport`] and [`RemoteRecord`].
//!
//! Encoding reuses the report's archived system fields so the store treats a
//! save as an update of the same record. Photos travel out of band: they are
//! staged as temporary files and referenced from the record, and the files
//! live exactly as long as the returned [`StagedRecord`].

use std::path::Path;

use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::models::{
    Asset, EncodedSystemFields, FieldValue, HazardReport, Location, Photo, RemoteRecord,
};

/// Record type name for hazard reports in the remote store.
pub const HAZARD_RECORD_TYPE: &str = "HazardReport";

pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_LOCATION: &str = "location";
pub const FIELD_PHOTO: &str = "photo";
pub const FIELD_IS_EMERGENCY: &str = "is_emergency";
pub const FIELD_IS_RESOLVED: &str = "is_resolved";

/// An encoded record together with the temporary files it references.
///
/// Dropping it removes the staged files, so keep it alive until the store has
/// finished the save.
#[derive(Debug)]
pub struct StagedRecord {
    record: RemoteRecord,
    staged_files: Vec<TempPath>,
}

impl StagedRecord {
    pub const fn record(&self) -> &RemoteRecord {
        &self.record
    }

    pub fn staged_paths(&self) -> impl Iterator<Item = &Path> {
        self.staged_files.iter().map(|path| &**path)
    }

    /// Take the record and discard the staged files.
    pub fn into_record(self) -> RemoteRecord {
        self.record
    }
}

/// Encode a report as a remote record.
///
/// Reports that were saved before keep their identity and change tag; unsaved
/// reports produce a record with no identity. A photo is written to a
/// uniquely named file under `staging_dir`.
pub fn to_remote(report: &HazardReport, staging_dir: &Path) -> Result<StagedRecord> {
    let mut record = match &report.system_fields {
        Some(encoded) => {
            let system = encoded.decode().map_err(|error| {
                Error::InvalidInput(format!("report carries unreadable system fields: {error}"))
            })?;
            if system.record_type != HAZARD_RECORD_TYPE {
                return Err(Error::RecordTypeMismatch {
                    expected: HAZARD_RECORD_TYPE.to_string(),
                    found: system.record_type,
                });
            }
            RemoteRecord::with_system_fields(system)
        }
        None => RemoteRecord::new(HAZARD_RECORD_TYPE),
    };

    record.set(
        FIELD_DESCRIPTION,
        FieldValue::Text(report.description.clone()),
    );
    record.set(FIELD_IS_EMERGENCY, FieldValue::Bool(report.is_emergency));
    record.set(FIELD_IS_RESOLVED, FieldValue::Bool(report.is_resolved));
    if let Some(location) = report.location {
        record.set(
            FIELD_LOCATION,
            FieldValue::Location {
                latitude: location.latitude,
                longitude: location.longitude,
            },
        );
    }

    let mut staged_files = Vec::new();
    if let Some(photo) = &report.photo {
        let path = stage_photo(photo, staging_dir)?;
        record.set(
            FIELD_PHOTO,
            FieldValue::Asset(Asset::File(path.to_path_buf())),
        );
        staged_files.push(path);
    }

    Ok(StagedRecord {
        record,
        staged_files,
    })
}

/// Decode a remote record into a report.
///
/// Missing or mistyped required fields yield [`Error::Decode`].
pub fn from_remote(record: &RemoteRecord) -> Result<HazardReport> {
    let record_id = record.display_id();
    let decode_error = |reason: String| Error::Decode {
        record_id: record_id.clone(),
        reason,
    };

    if record.record_type != HAZARD_RECORD_TYPE {
        return Err(decode_error(format!(
            "unexpected record type {}",
            record.record_type
        )));
    }

    let description = match record.get(FIELD_DESCRIPTION) {
        Some(FieldValue::Text(text)) => text.clone(),
        other => return Err(decode_error(field_problem(FIELD_DESCRIPTION, "text", other))),
    };
    let is_emergency = required_bool(record, FIELD_IS_EMERGENCY).map_err(&decode_error)?;
    let is_resolved = required_bool(record, FIELD_IS_RESOLVED).map_err(&decode_error)?;

    let location = match record.get(FIELD_LOCATION) {
        None => None,
        Some(FieldValue::Location {
            latitude,
            longitude,
        }) => Some(Location {
            latitude: *latitude,
            longitude: *longitude,
        }),
        other => return Err(decode_error(field_problem(FIELD_LOCATION, "location", other))),
    };

    let photo = match record.get(FIELD_PHOTO) {
        None => None,
        Some(FieldValue::Asset(asset)) => {
            let bytes = asset
                .read_bytes()
                .map_err(|error| decode_error(format!("photo asset unreadable: {error}")))?;
            Some(Photo::new(bytes))
        }
        other => return Err(decode_error(field_problem(FIELD_PHOTO, "asset", other))),
    };

    let system_fields = record
        .system
        .as_ref()
        .map(EncodedSystemFields::encode)
        .transpose()?;

    Ok(HazardReport {
        description,
        location,
        photo,
        is_emergency,
        is_resolved,
        created_at: record.created_at(),
        modified_at: record.modified_at(),
        system_fields,
    })
}

fn required_bool(record: &RemoteRecord, field: &str) -> std::result::Result<bool, String> {
    match record.get(field) {
        Some(FieldValue::Bool(value)) => Ok(*value),
        other => Err(field_problem(field, "bool", other)),
    }
}

fn field_problem(field: &str, expected: &str, found: Option<&FieldValue>) -> String {
    found.map_or_else(
        || format!("missing required field '{field}'"),
        |value| {
            format!(
                "field '{field}' should be {expected}, found {}",
                value.kind()
            )
        },
    )
}

fn stage_photo(photo: &Photo, staging_dir: &Path) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("hazard-photo-")
        .suffix(".jpg")
        .tempfile_in(staging_dir)?;
    std::io::Write::write_all(&mut file, photo.as_bytes())?;
    tracing::debug!(
        "Staged {} byte photo at {}",
        photo.len(),
        file.path().display()
    );
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordId, SystemFields};
    use pretty_assertions::assert_eq;

    fn saved_system_fields() -> SystemFields {
        SystemFields {
            record_id: RecordId::from("r-1"),
            record_type: HAZARD_RECORD_TYPE.to_string(),
            change_tag: 7,
            created_at: 1_700_000_000_000,
            modified_at: 1_700_000_500_000,
        }
    }

    fn full_report() -> HazardReport {
        HazardReport::new("Oil spill near bay 3")
            .with_location(Location::new(47.61, -122.33).unwrap())
            .with_photo(Photo::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]))
            .with_emergency(true)
    }

    /// Simulate the store ingesting staged assets before the files go away.
    fn ingest(mut record: RemoteRecord) -> RemoteRecord {
        for value in record.fields.values_mut() {
            if let FieldValue::Asset(asset) = value {
                let bytes = asset.read_bytes().unwrap();
                *asset = Asset::Bytes(bytes);
            }
        }
        record
    }

    #[test]
    fn unsaved_report_encodes_without_identity() {
        let dir = tempfile::tempdir().unwrap();
        let staged = to_remote(&HazardReport::new("Leak"), dir.path()).unwrap();

        assert!(staged.record().record_id().is_none());
        assert_eq!(staged.record().record_type, HAZARD_RECORD_TYPE);
        assert!(staged.record().get(FIELD_LOCATION).is_none());
        assert!(staged.record().get(FIELD_PHOTO).is_none());
    }

    #[test]
    fn saved_report_reuses_system_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = HazardReport::new("Leak");
        report.system_fields = Some(EncodedSystemFields::encode(&saved_system_fields()).unwrap());

        let staged = to_remote(&report, dir.path()).unwrap();
        assert_eq!(staged.record().system, Some(saved_system_fields()));
    }

    #[test]
    fn roundtrip_preserves_editable_fields_and_system_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = full_report();
        report.system_fields = Some(EncodedSystemFields::encode(&saved_system_fields()).unwrap());
        report.created_at = Some(saved_system_fields().created_at);
        report.modified_at = Some(saved_system_fields().modified_at);

        let staged = to_remote(&report, dir.path()).unwrap();
        let decoded = from_remote(&ingest(staged.record().clone())).unwrap();

        assert!(decoded.same_content(&report));
        assert_eq!(
            decoded.system_fields.as_ref().map(EncodedSystemFields::as_bytes),
            report.system_fields.as_ref().map(EncodedSystemFields::as_bytes)
        );
        assert_eq!(decoded, report);
    }

    #[test]
    fn roundtrip_without_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = HazardReport::new("Flickering light");
        report.is_resolved = true;

        let staged = to_remote(&report, dir.path()).unwrap();
        let decoded = from_remote(staged.record()).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn staged_photo_is_removed_when_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let staged = to_remote(&full_report(), dir.path()).unwrap();

        let paths: Vec<_> = staged.staged_paths().map(Path::to_path_buf).collect();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].exists());
        assert_eq!(
            std::fs::read(&paths[0]).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]
        );

        drop(staged);
        assert!(!paths[0].exists());
    }

    #[test]
    fn decode_reports_missing_description() {
        let mut record = RemoteRecord::with_system_fields(saved_system_fields());
        record.set(FIELD_IS_EMERGENCY, FieldValue::Bool(false));
        record.set(FIELD_IS_RESOLVED, FieldValue::Bool(false));

        match from_remote(&record).unwrap_err() {
            Error::Decode { record_id, reason } => {
                assert_eq!(record_id, "r-1");
                assert!(reason.contains("description"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_reports_mistyped_flag() {
        let mut record = RemoteRecord::with_system_fields(saved_system_fields());
        record.set(FIELD_DESCRIPTION, FieldValue::Text("Leak".to_string()));
        record.set(FIELD_IS_EMERGENCY, FieldValue::Text("yes".to_string()));
        record.set(FIELD_IS_RESOLVED, FieldValue::Bool(false));

        let error = from_remote(&record).unwrap_err();
        assert!(error.to_string().contains("is_emergency"));
    }

    #[test]
    fn decode_rejects_foreign_record_type() {
        let mut record = RemoteRecord::new("Note");
        record.set(FIELD_DESCRIPTION, FieldValue::Text("Leak".to_string()));
        assert!(matches!(
            from_remote(&record).unwrap_err(),
            Error::Decode { .. }
        ));
    }
}
