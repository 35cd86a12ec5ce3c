//! fundscape - Research funding landscape from OpenAlex
//!
//! Collects per-field, per-subfield funder counts for one country into a
//! CSV or Parquet table and serves that table as a JSON API.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "fundscape")]
#[command(about = "Research funding landscape from OpenAlex")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./fundscape.toml or ~/.config/fundscape/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Whole-request timeout in seconds
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Collect the funding table from OpenAlex
    Fetch(cmd::fetch::FetchArgs),
    /// Serve the funding table as a JSON API
    Serve(cmd::serve::ServeArgs),
    /// Show statistics and count anomalies of a table
    Inspect(cmd::inspect::InspectArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress = Arc::new(fundscape_core::ProgressContext::new());

    // Progress bars only exist during fetch; other commands log at info
    let is_tty = progress.is_tty();
    let fetching = matches!(cli.command, Command::Fetch(_));
    let multi = if is_tty && fetching {
        Some(progress.multi())
    } else {
        None
    };
    let quiet = is_tty && fetching && !cli.debug;
    fundscape_core::init_logging(quiet, cli.debug, multi)?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // Config file defaults, CLI overrides
    fundscape_core::set_http_config(fundscape_core::HttpConfig {
        read_timeout: std::time::Duration::from_secs(
            cli.read_timeout.unwrap_or(config.http.read_timeout),
        ),
        max_retries: cli.max_retries.unwrap_or(config.http.max_retries),
    });

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Serve(args) => cmd::serve::run(args, &config),
        Command::Inspect(args) => cmd::inspect::run(args, &config),
        Command::Config => {
            cmd::show_config(&config);
            Ok(())
        }
    }
}
