use std::path::Path;

use hazard_core::sync::ViewSpec;
use hazard_core::HazardReport;

use crate::commands::common::{
    format_report_lines, open_engine, report_to_list_item, ReportListItem,
};
use crate::error::CliError;

pub async fn list_reports(resolved: bool, data_dir: &Path) -> Result<Vec<HazardReport>, CliError> {
    let spec = if resolved {
        ViewSpec::resolved()
    } else {
        ViewSpec::active()
    };
    let engine = open_engine(data_dir).await?;
    Ok(engine.query_reports(&spec).await?)
}

pub async fn run_list(resolved: bool, as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let reports = list_reports(resolved, data_dir).await?;

    if as_json {
        let json_items = reports
            .iter()
            .map(report_to_list_item)
            .collect::<Vec<ReportListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if reports.is_empty() {
        println!("No reports.");
    } else {
        for line in format_report_lines(&reports) {
            println!("{line}");
        }
    }

    Ok(())
}
