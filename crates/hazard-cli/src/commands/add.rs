use std::path::{Path, PathBuf};

use hazard_core::models::{Location, Photo};
use hazard_core::HazardReport;

use crate::commands::common::{open_engine, resolve_description, save_backend};
use crate::error::CliError;

/// Optional report details captured alongside the description.
#[derive(Debug, Default)]
pub struct AddOptions {
    pub emergency: bool,
    /// Latitude and longitude, in degrees
    pub coordinates: Option<(f64, f64)>,
    pub photo: Option<PathBuf>,
}

pub async fn run_add(
    description_parts: &[String],
    options: &AddOptions,
    data_dir: &Path,
) -> Result<(), CliError> {
    let description = resolve_description(description_parts)?;

    let mut report = HazardReport::new(description).with_emergency(options.emergency);
    if let Some((latitude, longitude)) = options.coordinates {
        report = report.with_location(Location::new(latitude, longitude)?);
    }
    if let Some(path) = &options.photo {
        report = report.with_photo(Photo::new(std::fs::read(path)?));
    }

    let engine = open_engine(data_dir).await?;
    let saved = engine.create_report(&report).await?;
    save_backend(&engine, data_dir)?;

    if let Some(record_id) = saved.record_id() {
        println!("{record_id}");
    }
    Ok(())
}
