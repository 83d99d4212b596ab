//! Storyloom CLI — local-first AI-assisted book writing.
//!
//! Grows books segment by segment through streamed generation sessions and
//! reads them back in a paged terminal view.

mod commands;
mod reader;

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
