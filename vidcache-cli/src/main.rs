mod cli;
mod commands;

use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::Args;
use crate::commands::CommandExecutor;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let executor = CommandExecutor::new(&args)?;
    executor.execute(&args.command).await
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    // RUST_LOG wins over the flag-derived default.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}
