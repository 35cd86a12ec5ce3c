//! Inspect subcommand - statistics and count anomalies of a table

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;

use fundscape_core::fmt_num;
use fundscape_store::{TableFormat, find_count_anomalies, read_table};

use super::{print_summary, styled_table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Table to inspect (default: configured table path)
    pub path: Option<PathBuf>,

    /// Maximum anomalies to list
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

pub fn run(args: InspectArgs, config: &Config) -> Result<()> {
    let path = args
        .path
        .unwrap_or_else(|| config.output.table_path.clone());
    let table = read_table(&path).with_context(|| format!("Cannot load {}", path.display()))?;
    let stats = table.stats();
    let unknown = || "unknown".to_string();

    print_summary(
        "Table",
        &[
            ("Path", path.display().to_string()),
            ("Format", format!("{:?}", TableFormat::from_path(&path))),
            ("Records", fmt_num(stats.total as u64)),
            ("Fields", stats.fields.to_string()),
            ("Subfields", stats.subfields.to_string()),
            ("Funders", stats.funders.to_string()),
            ("Fetched", stats.fetch_date.unwrap_or_else(unknown)),
            ("Country", stats.country_code.unwrap_or_else(unknown)),
            ("Years", stats.year_range.unwrap_or_else(unknown)),
            (
                "Malformed topic rows",
                stats.malformed_topic_rows.to_string(),
            ),
            ("Count anomalies", stats.anomalies.to_string()),
        ],
    );

    let anomalies = find_count_anomalies(table.records());
    if !anomalies.is_empty() {
        let mut listing = styled_table(&["#", "Count anomaly"]);
        for (i, anomaly) in anomalies.iter().take(args.limit).enumerate() {
            listing.add_row(vec![Cell::new(i + 1), Cell::new(anomaly)]);
        }
        eprintln!("\n{listing}");
        if anomalies.len() > args.limit {
            eprintln!("... {} more", anomalies.len() - args.limit);
        }
    }
    Ok(())
}
