//! CLI command definitions
//!
//! Defines the clap commands for the browser-tests CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the tests declared by a YAML page
    Run {
        /// Path to the YAML page file
        path: PathBuf,

        /// Print the final published state as JSON
        #[arg(long)]
        json: bool,

        /// Register each container's tests last to first
        #[arg(long)]
        reverse_registration: bool,

        /// Configuration file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the markup-safe identifier of a label
    Id {
        /// Label to convert (test id, group title, ...)
        label: String,

        /// Also print the full SHA-256 of the label
        #[arg(long)]
        hash: bool,
    },
}
