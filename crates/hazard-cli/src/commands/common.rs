use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use hazard_core::config::EngineConfig;
use hazard_core::db::{Database, SqliteChangeTokenStore};
use hazard_core::remote::{MemoryRemoteStore, StoreSnapshot};
use hazard_core::sync::{SyncEngine, ViewSpec};
use hazard_core::{HazardReport, RecordId};
use serde::Serialize;

use crate::error::CliError;

pub const BACKEND_FILE: &str = "backend.json";
pub const DATABASE_FILE: &str = "hazard.db";
pub const CONFIG_FILE: &str = "engine.json";

/// Engine the CLI drives: a file-backed local backend plus a `SQLite` token.
pub type CliEngine = SyncEngine<MemoryRemoteStore, SqliteChangeTokenStore>;

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: String,
    pub preview: String,
    pub description: String,
    pub is_emergency: bool,
    pub is_resolved: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_bytes: Option<usize>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub relative_time: String,
}

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_data_dir.or_else(|| env::var_os("HAZARD_DATA_DIR").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_data_dir()
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("hazard"))
        .ok_or_else(|| CliError::Config("failed to resolve CLI data directory".to_string()))
}

pub fn load_config(data_dir: &Path) -> Result<EngineConfig, CliError> {
    Ok(EngineConfig::load(&data_dir.join(CONFIG_FILE))?)
}

/// Open the engine over the data directory and register the push subscription.
pub async fn open_engine(data_dir: &Path) -> Result<CliEngine, CliError> {
    std::fs::create_dir_all(data_dir)?;
    let config = load_config(data_dir)?;
    let store = load_backend(data_dir)?;
    let token_store = open_token_store(data_dir, &config)?;

    let engine = SyncEngine::new(store, token_store, config);
    engine.register_push_subscription().await;
    Ok(engine)
}

pub fn open_token_store(
    data_dir: &Path,
    config: &EngineConfig,
) -> Result<SqliteChangeTokenStore, CliError> {
    let db = Database::open(data_dir.join(DATABASE_FILE))?;
    Ok(SqliteChangeTokenStore::for_config(db, config))
}

pub fn load_backend(data_dir: &Path) -> Result<MemoryRemoteStore, CliError> {
    let path = data_dir.join(BACKEND_FILE);
    if !path.exists() {
        tracing::debug!("No backend snapshot at {}; starting empty", path.display());
        return Ok(MemoryRemoteStore::new());
    }
    let payload = std::fs::read(&path)?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&payload)?;
    Ok(MemoryRemoteStore::from_snapshot(snapshot))
}

pub fn save_backend(engine: &CliEngine, data_dir: &Path) -> Result<(), CliError> {
    let snapshot = engine.store().snapshot()?;
    let payload = serde_json::to_vec_pretty(&snapshot)?;
    let path = data_dir.join(BACKEND_FILE);
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, payload)?;
    std::fs::rename(&staging, &path)?;
    Ok(())
}

pub fn normalize_report_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyReportId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub async fn resolve_report_for_edit(
    report_query: &str,
    engine: &CliEngine,
) -> Result<HazardReport, CliError> {
    match engine.fetch_report(&RecordId::from(report_query)).await {
        Ok(report) => return Ok(report),
        Err(hazard_core::Error::NotFound(_)) => {}
        Err(error) => return Err(error.into()),
    }

    let mut matching = engine
        .query_reports(&ViewSpec::all())
        .await?
        .into_iter()
        .filter(|report| {
            report
                .record_id()
                .is_some_and(|id| id.as_str().starts_with(report_query))
        })
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::ReportNotFound(report_query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(short_id)
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousReportId(format!(
                "ID prefix '{report_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(report: &HazardReport) -> String {
    report
        .record_id()
        .map(|id| id.as_str().chars().take(13).collect())
        .unwrap_or_default()
}

pub fn format_report_lines(reports: &[HazardReport]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    reports
        .iter()
        .map(|report| {
            let short_id = short_id(report);
            let marker = if report.is_emergency { "!" } else { " " };
            let preview = report_preview(report, 40);
            let timestamp = if report.is_resolved {
                report.modified_at
            } else {
                report.created_at
            };
            let relative_time = timestamp
                .map(|timestamp| format_relative_time(timestamp, now_ms))
                .unwrap_or_default();

            format!("{short_id:<13} {marker} {preview:<40}  {relative_time}")
        })
        .collect()
}

pub fn report_to_list_item(report: &HazardReport) -> ReportListItem {
    let now_ms = Utc::now().timestamp_millis();

    ReportListItem {
        id: report
            .record_id()
            .map(|id| id.to_string())
            .unwrap_or_default(),
        preview: report_preview(report, 80),
        description: report.description.clone(),
        is_emergency: report.is_emergency,
        is_resolved: report.is_resolved,
        latitude: report.location.map(|location| location.latitude),
        longitude: report.location.map(|location| location.longitude),
        photo_bytes: report.photo.as_ref().map(hazard_core::models::Photo::len),
        created_at: report.created_at,
        modified_at: report.modified_at,
        relative_time: report
            .modified_at
            .map(|timestamp| format_relative_time(timestamp, now_ms))
            .unwrap_or_default(),
    }
}

pub fn report_preview(report: &HazardReport, max_chars: usize) -> String {
    let first_line = report.summary(usize::MAX);
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    const MINUTE: i64 = 60_000;
    const DAY: i64 = 24 * 60 * MINUTE;
    const UNITS: [(i64, &str); 6] = [
        (365 * DAY, "y"),
        (30 * DAY, "mo"),
        (7 * DAY, "w"),
        (DAY, "d"),
        (60 * MINUTE, "h"),
        (MINUTE, "m"),
    ];

    let diff = now_ms.saturating_sub(timestamp_ms);
    UNITS
        .iter()
        .find(|(size, _)| diff >= *size)
        .map_or_else(
            || "just now".to_string(),
            |(size, label)| format!("{}{label} ago", diff / size),
        )
}

pub fn resolve_description(description_parts: &[String]) -> Result<String, CliError> {
    if let Some(description) = normalize_description(&description_parts.join(" ")) {
        return Ok(description);
    }

    if let Some(description) = read_piped_stdin()? {
        return Ok(description);
    }

    if let Some(description) = capture_editor_input_with_initial("")? {
        return Ok(description);
    }

    Err(CliError::EmptyDescription)
}

pub fn normalize_description(description: &str) -> Option<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_description(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_description: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_report_file_path();
    std::fs::write(&temp_file, initial_description)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let description = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_description(&description))
}

/// Run `$EDITOR` on a file. The command may carry arguments (`code --wait`).
pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| CliError::EditorFailed("empty EDITOR command".into()))?;

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_report_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("hazard-report-{}-{now}.txt", std::process::id()))
}
