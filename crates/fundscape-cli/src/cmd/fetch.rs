//! Fetch subcommand - build the research-funding table from OpenAlex

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use fundscape_core::{SharedProgress, fmt_num};
use fundscape_openalex::FundingPredicate;

use super::print_summary;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Output table (.csv or .parquet)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// How works are restricted to funded research
    #[arg(long, value_enum)]
    pub funding: Option<FundingArg>,

    /// Contact address for the OpenAlex polite pool
    #[arg(long)]
    pub mailto: Option<String>,

    /// Requests allowed per budget window
    #[arg(long)]
    pub max_requests: Option<u32>,

    /// Zstd compression level for Parquet output (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum FundingArg {
    HasGrants,
    DateRange,
}

impl From<FundingArg> for FundingPredicate {
    fn from(f: FundingArg) -> Self {
        match f {
            FundingArg::HasGrants => FundingPredicate::HasGrants,
            FundingArg::DateRange => FundingPredicate::DateRange,
        }
    }
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let mut oa_config = config.openalex();
    if let Some(output) = args.output {
        oa_config.table_path = output;
    }
    if let Some(funding) = args.funding {
        oa_config.scope.funding = funding.into();
    }
    if args.mailto.is_some() {
        oa_config.mailto = args.mailto;
    }
    if let Some(max_requests) = args.max_requests {
        oa_config.max_requests = max_requests;
    }
    if let Some(level) = args.zstd_level {
        oa_config.compression_level = level;
    }

    if let Err(e) = fundscape_core::install_signal_handlers() {
        log::warn!("Failed to install signal handlers: {e}");
    }

    log::info!("Fetching OpenAlex research funding data");
    log::info!("  Output: {}", oa_config.table_path.display());
    log::info!(
        "  Budget: {} requests per {:?}",
        oa_config.max_requests,
        oa_config.per
    );
    if oa_config.mailto.is_none() {
        log::warn!("No mailto configured; OpenAlex may rate-limit anonymous requests");
    }

    let summary = fundscape_openalex::run(&oa_config, progress)?;

    let mut rows = vec![
        (
            "Fields",
            format!(
                "{}/{} ({} failed)",
                summary.fields_done,
                summary.fields_total,
                summary.failed_fields.len()
            ),
        ),
        ("Records", fmt_num(summary.records as u64)),
        ("Subfields", fmt_num(summary.subfields as u64)),
        ("Funders", fmt_num(summary.funders as u64)),
        (
            "Queries",
            match summary.requests {
                Some(requests) => format!(
                    "{} ({} requests)",
                    fmt_num(summary.queries),
                    fmt_num(requests)
                ),
                None => fmt_num(summary.queries),
            },
        ),
        ("Count anomalies", summary.anomalies.to_string()),
        ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ];
    if summary.written {
        rows.push(("Saved to", summary.table_path.display().to_string()));
    }
    print_summary("OpenAlex", &rows);

    for (name, error) in &summary.failed_fields {
        log::warn!("Skipped {name}: {error}");
    }

    if summary.interrupted {
        anyhow::bail!("Interrupted; table not written");
    }
    if !summary.written {
        anyhow::bail!("No data was fetched. Check the API connection");
    }
    Ok(())
}
