use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] hazard_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No hazard description provided")]
    EmptyDescription,
    #[error("Edited description cannot be empty")]
    EmptyEditedDescription,
    #[error("Report ID cannot be empty")]
    EmptyReportId,
    #[error("Report not found for id/prefix: {0}")]
    ReportNotFound(String),
    #[error("{0}")]
    AmbiguousReportId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
