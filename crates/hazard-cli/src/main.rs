//! Hazard CLI - report hazards and keep a device in sync from the terminal

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands, TokenCommands};
use crate::commands::add::{run_add, AddOptions};
use crate::commands::common::resolve_data_dir;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::resolve::run_resolve;
use crate::commands::show::run_show;
use crate::commands::sync::run_sync;
use crate::commands::token::{run_token_reset, run_token_show};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "hazard=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Add {
            description,
            emergency,
            lat,
            lon,
            photo,
        } => {
            let data_dir = resolve_data_dir(cli.data_dir)?;
            let options = AddOptions {
                emergency,
                coordinates: lat.zip(lon),
                photo,
            };
            run_add(&description, &options, &data_dir).await?;
        }
        Commands::Edit {
            id,
            description,
            emergency,
        } => {
            let data_dir = resolve_data_dir(cli.data_dir)?;
            run_edit(&id, description.as_deref(), emergency, &data_dir).await?;
        }
        Commands::Resolve { id } => run_resolve(&id, &resolve_data_dir(cli.data_dir)?).await?,
        Commands::Delete { id } => run_delete(&id, &resolve_data_dir(cli.data_dir)?).await?,
        Commands::List { resolved, json } => {
            run_list(resolved, json, &resolve_data_dir(cli.data_dir)?).await?;
        }
        Commands::Show { id, json } => {
            run_show(&id, json, &resolve_data_dir(cli.data_dir)?).await?;
        }
        Commands::Sync { json } => run_sync(json, &resolve_data_dir(cli.data_dir)?).await?,
        Commands::Token { command } => {
            let data_dir = resolve_data_dir(cli.data_dir)?;
            match command {
                TokenCommands::Show => run_token_show(&data_dir)?,
                TokenCommands::Reset => run_token_reset(&data_dir)?,
            }
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
