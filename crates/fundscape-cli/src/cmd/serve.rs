//! Serve subcommand - JSON API over the table

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use fundscape_server::AppState;
use fundscape_store::TableStore;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Table to serve (.csv or .parquet)
    #[arg(short, long)]
    pub table: Option<PathBuf>,
}

pub fn run(args: ServeArgs, config: &Config) -> Result<()> {
    let listen = args.listen.unwrap_or(config.server.listen);
    let table = args
        .table
        .unwrap_or_else(|| config.output.table_path.clone());

    log::info!("Serving {}", table.display());
    let state = Arc::new(AppState::new(TableStore::new(table)));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(fundscape_server::serve(listen, state))
}
