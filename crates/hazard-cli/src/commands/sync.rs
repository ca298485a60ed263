use std::path::Path;

use hazard_core::codec;
use hazard_core::models::{ChangeEvent, RecordChange};
use serde::Serialize;

use crate::commands::common::{open_engine, report_preview};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncChangeItem {
    pub reason: String,
    pub id: String,
    pub preview: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncOutput {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub token_persisted: bool,
    pub changes: Vec<SyncChangeItem>,
}

/// Run one sync cycle and return what it delivered.
pub async fn sync_changes(data_dir: &Path) -> Result<SyncOutput, CliError> {
    let engine = open_engine(data_dir).await?;
    let mut subscription = engine.subscribe();
    let summary = engine.sync_remote_changes().await?;
    let changes = subscription.drain().iter().map(change_to_item).collect();
    engine.shutdown();

    Ok(SyncOutput {
        created: summary.created,
        updated: summary.updated,
        deleted: summary.deleted,
        token_persisted: summary.token_persisted,
        changes,
    })
}

pub async fn run_sync(as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let output = sync_changes(data_dir).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if output.changes.is_empty() {
        println!("Already up to date.");
    } else {
        for line in format_sync_lines(&output.changes) {
            println!("{line}");
        }
    }
    if !output.token_persisted {
        eprintln!("Warning: change token was not saved; the next sync will repeat these changes.");
    }
    Ok(())
}

pub fn format_sync_lines(changes: &[SyncChangeItem]) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            let short_id = change.id.chars().take(13).collect::<String>();
            match &change.preview {
                Some(preview) => format!("{:<8} {short_id:<13}  {preview}", change.reason),
                None => format!("{:<8} {short_id}", change.reason),
            }
        })
        .collect()
}

fn change_to_item(event: &ChangeEvent) -> SyncChangeItem {
    let preview = match &event.change {
        RecordChange::Created(record) | RecordChange::Updated(record) => codec::from_remote(record)
            .ok()
            .map(|report| report_preview(&report, 60)),
        RecordChange::Deleted(_) => None,
    };

    SyncChangeItem {
        reason: event.change.reason().to_string(),
        id: event
            .change
            .record_id()
            .map(ToString::to_string)
            .unwrap_or_default(),
        preview,
    }
}
