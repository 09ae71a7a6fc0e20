//! raidctl - operator CLI for the raidboard schedule board
//!
//! Every editing command loads the board, applies one edit locally with the
//! same constraint checks as the web board, then batch-saves it.

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
