//! LinkDigest CLI: incremental link enrichment.
//!
//! Extracts, summarizes, embeds and clusters the pages behind a list of
//! URLs, skipping every URL that was ingested before.

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
