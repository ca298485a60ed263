use std::path::Path;

use hazard_core::HazardReport;

use crate::commands::common::{
    format_timestamp, normalize_report_identifier, open_engine, report_to_list_item,
    resolve_report_for_edit,
};
use crate::error::CliError;

pub async fn run_show(id: &str, as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_report_identifier(id)?;
    let engine = open_engine(data_dir).await?;
    let report = resolve_report_for_edit(&normalized_id, &engine).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report_to_list_item(&report))?
        );
    } else {
        for line in format_report_details(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_report_details(report: &HazardReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "id:        {}",
            report
                .record_id()
                .map(|id| id.to_string())
                .unwrap_or_default()
        ),
        format!(
            "status:    {}{}",
            if report.is_resolved { "resolved" } else { "active" },
            if report.is_emergency { ", emergency" } else { "" }
        ),
    ];
    if let Some(location) = report.location {
        lines.push(format!(
            "location:  {:.5}, {:.5}",
            location.latitude, location.longitude
        ));
    }
    if let Some(photo) = &report.photo {
        lines.push(format!("photo:     {} bytes", photo.len()));
    }
    if let Some(created_at) = report.created_at {
        lines.push(format!("created:   {}", format_timestamp(created_at)));
    }
    if let Some(modified_at) = report.modified_at {
        lines.push(format!("modified:  {}", format_timestamp(modified_at)));
    }
    lines.push(String::new());
    lines.push(report.description.clone());
    lines
}
