use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "hazard")]
#[command(about = "Report and track workplace hazards from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the backend snapshot and the change token database
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report a new hazard
    #[command(alias = "new")]
    Add {
        /// Hazard description (read from stdin or $EDITOR when omitted)
        description: Vec<String>,
        /// Flag the hazard as an emergency
        #[arg(long)]
        emergency: bool,
        /// Latitude in degrees
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude in degrees
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Photo file to attach
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
    },
    /// Edit an existing report
    Edit {
        /// Report ID or unique ID prefix
        id: String,
        /// New description (opens $EDITOR when no change is given)
        #[arg(long)]
        description: Option<String>,
        /// Set or clear the emergency flag
        #[arg(long, value_name = "BOOL")]
        emergency: Option<bool>,
    },
    /// Mark a report resolved
    Resolve {
        /// Report ID or unique ID prefix
        id: String,
    },
    /// Delete a report
    Delete {
        /// Report ID or unique ID prefix
        id: String,
    },
    /// List active reports, oldest first
    List {
        /// List resolved reports instead, most recently modified first
        #[arg(long)]
        resolved: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one report
    Show {
        /// Report ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch changes made since the last sync
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or reset the stored change token
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Print the stored token
    Show,
    /// Forget the stored token; the next sync starts from scratch
    Reset,
}
