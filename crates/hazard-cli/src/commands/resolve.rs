use std::path::Path;

use crate::commands::common::{
    normalize_report_identifier, open_engine, resolve_report_for_edit, save_backend, short_id,
};
use crate::error::CliError;

pub async fn run_resolve(id: &str, data_dir: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_report_identifier(id)?;
    let engine = open_engine(data_dir).await?;
    let report = resolve_report_for_edit(&normalized_id, &engine).await?;

    if report.is_resolved {
        println!("{}", short_id(&report));
        return Ok(());
    }

    let resolved = engine.resolve_report(&report).await?;
    save_backend(&engine, data_dir)?;
    println!("{}", short_id(&resolved));
    Ok(())
}
