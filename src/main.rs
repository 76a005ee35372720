//! browser-tests - run document-declared tests one at a time
//!
//! Builds documents from YAML pages, runs their test containers and reports
//! the published results the way an automation driver would.

use browser_tests::common::logging;
use browser_tests::{cli, commands};
use clap::Parser;
use commands::Commands;

#[derive(Parser)]
#[command(name = "browser-tests", about = "Document-declared test coordinator")]
#[command(version, long_about = None)]
struct Cli {
    /// Debug logging and progress output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command, cli.verbose).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
