mod cli;
mod form;
mod model;
mod orchestrator;
mod render;
mod service;
mod session;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the log subscriber. The TUI owns the terminal, so it only logs to a file.
fn init_tracing(args: &cli::Cli, is_non_tui: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hotspot_cli=info"));

    if let Some(path) = args.log_file.as_ref() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if is_non_tui {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text || cfg!(not(feature = "tui"));
    init_tracing(&args, is_non_tui)?;

    cli::run(args).await?;
    // Explicitly exit with code 0 on success, especially for non-TUI modes
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}
