use std::path::Path;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_description, normalize_report_identifier,
    open_engine, resolve_report_for_edit, save_backend, short_id,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    description: Option<&str>,
    emergency: Option<bool>,
    data_dir: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_report_identifier(id)?;
    let engine = open_engine(data_dir).await?;
    let report = resolve_report_for_edit(&normalized_id, &engine).await?;

    let mut edited = report.clone();
    match (description, emergency) {
        (None, None) => {
            let Some(description) = capture_editor_input_with_initial(&report.description)?
            else {
                return Err(CliError::EmptyEditedDescription);
            };
            edited.description = description;
        }
        (description, emergency) => {
            if let Some(description) = description {
                edited.description =
                    normalize_description(description).ok_or(CliError::EmptyEditedDescription)?;
            }
            if let Some(emergency) = emergency {
                edited.is_emergency = emergency;
            }
        }
    }

    if edited.same_content(&report) {
        println!("{}", short_id(&report));
        return Ok(());
    }

    let updated = engine.update_report(&edited).await?;
    save_backend(&engine, data_dir)?;
    println!("{}", short_id(&updated));
    Ok(())
}
