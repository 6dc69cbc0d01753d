//! Reelway CLI - Command-line interface
//!
//! Resolves mirror pages, serves local files over the range server and runs
//! the simulated download pipeline end to end.

mod commands;

use clap::Parser;
use reelway_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "reelway")]
#[command(about = "Resolve mirror pages and stream downloads to a local player")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), None) {
        eprintln!("Warning: file logging unavailable: {e}");
    }

    commands::handle_command(cli.command).await
}
