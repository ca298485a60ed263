//! hazard-core - Core library for Hazard
//!
//! This crate contains the hazard report model, the codec between reports and
//! remote records, the change token store, and the incremental sync machinery
//! (delta fetcher, reconciler, change broadcaster) shared by every Hazard
//! interface.

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ChangeToken, HazardReport, RecordChange, RecordId, RemoteRecord};
pub use state::SyncState;
