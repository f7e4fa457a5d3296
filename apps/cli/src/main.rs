//! sheetsync CLI: keep a local content store in sync with spreadsheets.
//!
//! Rows of each configured sheet become content records; repeated runs only
//! write what changed.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
