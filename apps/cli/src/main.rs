//! objectivedb CLI: builds a database of teacher-certification test
//! objectives, verified where an official source exists and inferred
//! with explicit confidence where it does not.

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
