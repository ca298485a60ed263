use std::fmt::Write as _;
use std::path::Path;

use hazard_core::db::ChangeTokenStore;
use hazard_core::ChangeToken;

use crate::commands::common::{load_config, open_token_store};
use crate::error::CliError;

pub fn load_token(data_dir: &Path) -> Result<Option<ChangeToken>, CliError> {
    let config = load_config(data_dir)?;
    std::fs::create_dir_all(data_dir)?;
    Ok(open_token_store(data_dir, &config)?.load())
}

pub fn run_token_show(data_dir: &Path) -> Result<(), CliError> {
    match load_token(data_dir)? {
        Some(token) => println!("{}", format_token(&token)),
        None => println!("No change token stored; the next sync fetches everything."),
    }
    Ok(())
}

pub fn run_token_reset(data_dir: &Path) -> Result<(), CliError> {
    let config = load_config(data_dir)?;
    std::fs::create_dir_all(data_dir)?;
    open_token_store(data_dir, &config)?.save(None)?;
    println!("Change token cleared.");
    Ok(())
}

/// Tokens are opaque; show them as hex.
pub fn format_token(token: &ChangeToken) -> String {
    token
        .as_bytes()
        .iter()
        .fold(String::new(), |mut output, byte| {
            let _ = write!(output, "{byte:02x}");
            output
        })
}
