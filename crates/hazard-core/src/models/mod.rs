//! Data models for Hazard

mod change;
mod record;
mod report;

pub use change::{
    ChangeEvent, ChangeNotification, ChangeOrigin, ChangeReason, NotificationBatch, RecordChange,
};
pub use record::{Asset, ChangeToken, FieldValue, RecordId, RemoteRecord, SystemFields};
pub use report::{EncodedSystemFields, HazardReport, Location, Photo};
