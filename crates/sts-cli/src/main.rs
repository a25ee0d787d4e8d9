mod bootstrap;
mod cli_args;
mod settings;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::{init_tracing, run_server};
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_server(cli).await
}
