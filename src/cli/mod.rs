//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::document::id;
use crate::page::runner::{self, RunOptions};

/// Dispatch a CLI command
///
/// Returns false when the command ran but the tests it ran did not all pass.
pub async fn dispatch(command: Commands, verbose: bool) -> Result<bool> {
    match command {
        Commands::Run {
            path,
            json,
            reverse_registration,
            config,
        } => {
            let config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            tracing::debug!(?config, "configuration loaded");

            let options = RunOptions {
                verbose,
                json,
                reverse_registration,
            };
            let summary = runner::run_page(&path, &options, &config).await?;
            Ok(summary.passed())
        }

        Commands::Id { label, hash } => {
            println!("{}", id::to_valid_dom_id(&label));
            if hash {
                println!("{}", id::label_hash(&label));
            }
            Ok(true)
        }
    }
}
