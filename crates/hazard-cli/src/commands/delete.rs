use std::path::Path;

use crate::commands::common::{
    normalize_report_identifier, open_engine, resolve_report_for_edit, save_backend,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, data_dir: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_report_identifier(id)?;
    let engine = open_engine(data_dir).await?;
    let report = resolve_report_for_edit(&normalized_id, &engine).await?;

    let deleted = engine.delete_report(&report).await?;
    save_backend(&engine, data_dir)?;
    println!("{deleted}");
    Ok(())
}
