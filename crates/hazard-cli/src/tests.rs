use std::path::Path;

use hazard_core::{ChangeToken, HazardReport};
use pretty_assertions::assert_eq;

use crate::cli::CompletionShell;
use crate::commands::add::{run_add, AddOptions};
use crate::commands::common::{
    default_editor, format_relative_time, format_report_lines, format_timestamp,
    normalize_description, normalize_report_identifier, open_engine, report_preview,
    report_to_list_item, resolve_report_for_edit, BACKEND_FILE, CONFIG_FILE,
};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::list_reports;
use crate::commands::resolve::run_resolve;
use crate::commands::show::format_report_details;
use crate::commands::sync::{format_sync_lines, sync_changes};
use crate::commands::token::{format_token, load_token, run_token_reset};
use crate::error::CliError;

async fn add(description: &str, data_dir: &Path) {
    run_add(&[description.to_string()], &AddOptions::default(), data_dir)
        .await
        .unwrap();
}

async fn only_id(resolved: bool, data_dir: &Path) -> String {
    let reports = list_reports(resolved, data_dir).await.unwrap();
    assert_eq!(reports.len(), 1);
    reports[0].record_id().unwrap().to_string()
}

#[test]
fn normalize_description_trims_and_rejects_empty() {
    assert_eq!(
        normalize_description("  wet floor  "),
        Some("wet floor".to_string())
    );
    assert_eq!(normalize_description(" \n\t "), None);
}

#[test]
fn normalize_report_identifier_rejects_empty() {
    assert!(matches!(
        normalize_report_identifier(" \n "),
        Err(CliError::EmptyReportId)
    ));
    assert_eq!(normalize_report_identifier("  abc123  ").unwrap(), "abc123");
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn report_preview_truncates_with_ellipsis() {
    let report = HazardReport::new("Loose   floor tile near the\nsecond line");
    assert_eq!(report_preview(&report, 40), "Loose floor tile near the");
    assert_eq!(report_preview(&report, 12), "Loose flo...");
}

#[test]
fn format_timestamp_returns_utc_label() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_token_renders_hex() {
    assert_eq!(
        format_token(&ChangeToken::from_bytes(vec![0x00, 0x1f, 0xab])),
        "001fab"
    );
}

#[test]
fn report_details_include_status_and_description() {
    let mut report = HazardReport::new("Frayed cable").with_emergency(true);
    report.created_at = Some(0);

    let lines = format_report_details(&report);
    assert!(lines.iter().any(|line| line.contains("active, emergency")));
    assert!(lines.iter().any(|line| line.contains("1970-01-01")));
    assert_eq!(lines.last().map(String::as_str), Some("Frayed cable"));
}

#[tokio::test]
async fn add_then_list_and_resolve_by_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    add("Spilled coolant by lathe", tmp.path()).await;
    assert!(tmp.path().join(BACKEND_FILE).exists());

    let id = only_id(false, tmp.path()).await;
    assert!(list_reports(true, tmp.path()).await.unwrap().is_empty());

    run_resolve(&id[..20], tmp.path()).await.unwrap();

    assert!(list_reports(false, tmp.path()).await.unwrap().is_empty());
    assert_eq!(only_id(true, tmp.path()).await, id);
}

#[tokio::test]
async fn add_with_location_and_photo() {
    let tmp = tempfile::tempdir().unwrap();
    let photo_path = tmp.path().join("photo.jpg");
    std::fs::write(&photo_path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

    let options = AddOptions {
        emergency: true,
        coordinates: Some((47.6, -122.3)),
        photo: Some(photo_path),
    };
    run_add(&["Gas".to_string(), "smell".to_string()], &options, tmp.path())
        .await
        .unwrap();

    let reports = list_reports(false, tmp.path()).await.unwrap();
    let item = report_to_list_item(&reports[0]);
    assert_eq!(item.description, "Gas smell");
    assert!(item.is_emergency);
    assert_eq!(item.latitude, Some(47.6));
    assert_eq!(item.longitude, Some(-122.3));
    assert_eq!(item.photo_bytes, Some(4));
}

#[tokio::test]
async fn add_rejects_out_of_range_location() {
    let tmp = tempfile::tempdir().unwrap();
    let options = AddOptions {
        coordinates: Some((120.0, 0.0)),
        ..AddOptions::default()
    };

    let error = run_add(&["Nowhere".to_string()], &options, tmp.path())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(hazard_core::Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn edit_updates_description_and_flag() {
    let tmp = tempfile::tempdir().unwrap();
    add("Blocked exit", tmp.path()).await;
    let id = only_id(false, tmp.path()).await;

    run_edit(&id, Some("Blocked fire exit, east wing"), Some(true), tmp.path())
        .await
        .unwrap();

    let reports = list_reports(false, tmp.path()).await.unwrap();
    assert_eq!(reports[0].description, "Blocked fire exit, east wing");
    assert!(reports[0].is_emergency);
    assert!(format_report_lines(&reports)[0].contains(" ! "));
}

#[tokio::test]
async fn edit_rejects_blank_description() {
    let tmp = tempfile::tempdir().unwrap();
    add("Blocked exit", tmp.path()).await;
    let id = only_id(false, tmp.path()).await;

    let error = run_edit(&id, Some("   "), None, tmp.path())
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::EmptyEditedDescription));
}

#[tokio::test]
async fn resolve_report_rejects_ambiguous_and_missing_ids() {
    let tmp = tempfile::tempdir().unwrap();
    add("First", tmp.path()).await;
    add("Second", tmp.path()).await;
    let engine = open_engine(tmp.path()).await.unwrap();

    // Time-ordered ids created moments apart share their leading digits.
    let reports = list_reports(false, tmp.path()).await.unwrap();
    let shared = reports[0].record_id().unwrap().as_str()[..4].to_string();
    assert!(matches!(
        resolve_report_for_edit(&shared, &engine).await.unwrap_err(),
        CliError::AmbiguousReportId(_)
    ));

    assert!(matches!(
        resolve_report_for_edit("does-not-exist", &engine)
            .await
            .unwrap_err(),
        CliError::ReportNotFound(_)
    ));
}

#[tokio::test]
async fn delete_by_exact_id() {
    let tmp = tempfile::tempdir().unwrap();
    add("Keep me", tmp.path()).await;
    let keep = only_id(false, tmp.path()).await;
    add("Delete me", tmp.path()).await;

    let reports = list_reports(false, tmp.path()).await.unwrap();
    let doomed = reports
        .iter()
        .find(|report| report.description == "Delete me")
        .and_then(HazardReport::record_id)
        .unwrap();

    run_delete(doomed.as_str(), tmp.path()).await.unwrap();
    assert_eq!(only_id(false, tmp.path()).await, keep);
}

#[tokio::test]
async fn sync_resumes_from_stored_token() {
    let tmp = tempfile::tempdir().unwrap();
    add("Leak", tmp.path()).await;
    assert!(load_token(tmp.path()).unwrap().is_none());

    let first = sync_changes(tmp.path()).await.unwrap();
    assert_eq!(first.created, 1);
    assert!(first.token_persisted);
    assert_eq!(first.changes[0].reason, "created");
    assert_eq!(first.changes[0].preview.as_deref(), Some("Leak"));
    assert!(format_sync_lines(&first.changes)[0].starts_with("created"));
    assert!(load_token(tmp.path()).unwrap().is_some());

    let second = sync_changes(tmp.path()).await.unwrap();
    assert!(second.changes.is_empty());

    let id = only_id(false, tmp.path()).await;
    run_resolve(&id, tmp.path()).await.unwrap();
    run_delete(&id, tmp.path()).await.unwrap();
    // The update and the deletion collapse into one delta.
    let third = sync_changes(tmp.path()).await.unwrap();
    assert_eq!(third.changes.len(), 1);
    assert_eq!(third.deleted, 1);
    assert_eq!(third.updated, 0);
}

#[tokio::test]
async fn token_reset_forces_full_resync() {
    let tmp = tempfile::tempdir().unwrap();
    add("Leak", tmp.path()).await;
    sync_changes(tmp.path()).await.unwrap();

    run_token_reset(tmp.path()).unwrap();
    assert!(load_token(tmp.path()).unwrap().is_none());

    let resync = sync_changes(tmp.path()).await.unwrap();
    assert_eq!(resync.created, 1);
}

#[tokio::test]
async fn engine_config_file_is_honored() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join(CONFIG_FILE),
        r#"{"token_key": "tablet", "subscription_id": "floor-3"}"#,
    )
    .unwrap();
    add("Leak", tmp.path()).await;

    let engine = open_engine(tmp.path()).await.unwrap();
    let subscriptions = engine.store().subscriptions().unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].subscription_id, "floor-3");
    drop(engine);

    sync_changes(tmp.path()).await.unwrap();
    assert!(load_token(tmp.path()).unwrap().is_some());
}

#[tokio::test]
async fn malformed_config_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(CONFIG_FILE), r#"{"colour": "red"}"#).unwrap();

    assert!(matches!(
        open_engine(tmp.path()).await,
        Err(CliError::Core(hazard_core::Error::InvalidInput(_)))
    ));
}

#[test]
fn run_completions_writes_bash_script_file() {
    let tmp = tempfile::tempdir().unwrap();
    let output_path = tmp.path().join("hazard.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_hazard()"));
    assert!(script.contains("complete -F _hazard"));
}
