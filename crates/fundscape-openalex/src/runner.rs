//! Collection run orchestration: traverse, check counts, write the table

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Context;
use fundscape_core::{ProgressContext, RequestBudget, RetryPolicy, shutdown_flag};
use fundscape_store::{find_count_anomalies, write_table};

use crate::collector::{Collection, collect};
use crate::config::Config;
use crate::source::{GroupedCountSource, OpenAlexSource};

/// Anomalies logged individually before switching to a count
const MAX_LOGGED_ANOMALIES: usize = 20;

/// Run a collection against the live OpenAlex API.
pub fn run(config: &Config, progress: &ProgressContext) -> anyhow::Result<CollectSummary> {
    let budget = RequestBudget::new(config.max_requests, config.per);
    let source = OpenAlexSource::new(
        &config.base_url,
        config.mailto.clone(),
        budget,
        RetryPolicy::from_http_config(),
    );
    let mut summary = run_with_source(&source, config, shutdown_flag(), progress)?;
    summary.requests = Some(source.requests_sent());
    Ok(summary)
}

/// Run a collection against any grouped-count source.
///
/// The walk stops before the next field once `stop` is set. Nothing is
/// written when the run was interrupted or produced no records.
pub fn run_with_source<S: GroupedCountSource + ?Sized>(
    source: &S,
    config: &Config,
    stop: &AtomicBool,
    progress: &ProgressContext,
) -> anyhow::Result<CollectSummary> {
    log::info!(
        "collecting {} works {} ({}), caps {}/{}/{}",
        config.scope.country_code,
        config.scope.year_range(),
        config.scope.funding,
        config.caps.subfields,
        config.caps.funders,
        config.caps.topics
    );

    let collection = collect(source, &config.scope, config.caps, stop, progress);

    let anomalies = find_count_anomalies(&collection.records);
    for anomaly in anomalies.iter().take(MAX_LOGGED_ANOMALIES) {
        log::warn!("count anomaly: {anomaly}");
    }
    if anomalies.len() > MAX_LOGGED_ANOMALIES {
        log::warn!(
            "... and {} more count anomalies",
            anomalies.len() - MAX_LOGGED_ANOMALIES
        );
    }

    let mut summary = CollectSummary::from_collection(&collection, config.table_path.clone());
    summary.anomalies = anomalies.len();

    if collection.interrupted {
        log::warn!("run interrupted, table not written");
    } else if collection.records.is_empty() {
        log::warn!("no data was fetched, table not written");
    } else {
        write_table(
            &config.table_path,
            &collection.records,
            config.compression_level,
        )
        .with_context(|| format!("failed to write {}", config.table_path.display()))?;
        summary.written = true;
    }

    summary.log();
    Ok(summary)
}

/// Summary of a collection run
#[derive(Debug, Clone)]
pub struct CollectSummary {
    pub fields_total: usize,
    pub fields_done: usize,
    /// `(field name, error)` for every skipped field
    pub failed_fields: Vec<(String, String)>,
    pub records: usize,
    pub subfields: usize,
    pub funders: usize,
    pub queries: u64,
    /// HTTP requests including retries, when the source counts them
    pub requests: Option<u64>,
    pub anomalies: usize,
    pub duplicates_dropped: usize,
    pub interrupted: bool,
    pub written: bool,
    pub table_path: PathBuf,
    pub elapsed: Duration,
}

impl CollectSummary {
    fn from_collection(collection: &Collection, table_path: PathBuf) -> Self {
        let records = &collection.records;
        Self {
            fields_total: collection.stats.fields_total,
            fields_done: collection.stats.fields_done,
            failed_fields: collection
                .failed_fields
                .iter()
                .map(|f| (f.field_name.clone(), f.error.clone()))
                .collect(),
            records: records.len(),
            subfields: records
                .iter()
                .map(|r| r.subfield_id)
                .collect::<HashSet<_>>()
                .len(),
            funders: records
                .iter()
                .map(|r| r.funder_id.as_str())
                .collect::<HashSet<_>>()
                .len(),
            queries: collection.stats.queries,
            requests: None,
            anomalies: 0,
            duplicates_dropped: collection.stats.duplicates_dropped,
            interrupted: collection.interrupted,
            written: false,
            table_path,
            elapsed: collection.stats.elapsed,
        }
    }

    pub fn log(&self) {
        log::info!("=== Collection Summary ===");
        log::info!(
            "Fields: {}/{} completed ({} failed)",
            self.fields_done,
            self.fields_total,
            self.failed_fields.len()
        );
        for (name, error) in &self.failed_fields {
            log::info!("  skipped {name}: {error}");
        }
        log::info!(
            "Records: {} ({} subfields, {} funders)",
            self.records,
            self.subfields,
            self.funders
        );
        match self.requests {
            Some(requests) => log::info!("Queries: {} ({requests} requests)", self.queries),
            None => log::info!("Queries: {}", self.queries),
        }
        if self.anomalies > 0 {
            log::info!("Count anomalies: {}", self.anomalies);
        }
        if self.written {
            log::info!("Saved to {}", self.table_path.display());
        }
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::{FakeSource, StopDuringFirstField};
    use crate::filter::Dimension;
    use fundscape_store::read_table;
    use tempfile::TempDir;

    fn config(dir: &TempDir, name: &str) -> Config {
        Config {
            table_path: dir.path().join(name),
            ..Config::default()
        }
    }

    fn source() -> FakeSource {
        FakeSource::default()
            .add(Dimension::Subfield, "17", &[("1702", 900)])
            .add(Dimension::Funder, "1702", &[("F1", 300), ("F2", 1200)])
            .add(Dimension::Topic, "F1", &[("T1", 40)])
    }

    #[test]
    fn writes_table_and_summarizes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "out.csv");
        let summary =
            run_with_source(&source(), &config, &AtomicBool::new(false), &ProgressContext::with_tty(false)).unwrap();

        assert!(summary.written);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.subfields, 1);
        assert_eq!(summary.funders, 2);
        assert_eq!(summary.fields_total, 10);
        // F2 reports more works than its subfield
        assert_eq!(summary.anomalies, 1);
        assert_eq!(summary.requests, None);

        let table = read_table(&config.table_path).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn parquet_output_by_extension() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "out.parquet");
        run_with_source(&source(), &config, &AtomicBool::new(false), &ProgressContext::with_tty(false)).unwrap();
        let table = read_table(&config.table_path).unwrap();
        assert_eq!(table.records()[0].topics.entries().unwrap()[0].topic_id, "T1");
    }

    #[test]
    fn empty_collection_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "out.csv");
        let summary =
            run_with_source(
                &FakeSource::default(),
                &config,
                &AtomicBool::new(false),
                &ProgressContext::with_tty(false),
            )
                .unwrap();
        assert!(!summary.written);
        assert_eq!(summary.records, 0);
        assert!(!config.table_path.exists());
    }

    #[test]
    fn interrupted_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "out.csv");
        let stop = AtomicBool::new(false);
        // First target field is Chemical Engineering (15)
        let source = StopDuringFirstField {
            inner: FakeSource::default()
                .add(Dimension::Subfield, "15", &[("1500", 900)])
                .add(Dimension::Funder, "1500", &[("F1", 300), ("F2", 200)])
                .add(Dimension::Subfield, "16", &[("1600", 500)])
                .add(Dimension::Funder, "1600", &[("F3", 100)]),
            stop: &stop,
        };
        let summary =
            run_with_source(&source, &config, &stop, &ProgressContext::with_tty(false)).unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.fields_done, 1);
        assert_eq!(summary.records, 2);
        assert!(!summary.written);
        assert!(!config.table_path.exists());
    }

    #[test]
    fn summary_log_does_not_panic() {
        let summary = CollectSummary {
            fields_total: 10,
            fields_done: 9,
            failed_fields: vec![("Energy".into(), "HTTP 500: boom".into())],
            records: 3000,
            subfields: 180,
            funders: 900,
            queries: 3400,
            requests: Some(3410),
            anomalies: 2,
            duplicates_dropped: 0,
            interrupted: false,
            written: true,
            table_path: PathBuf::from("data/usa_research_data.csv"),
            elapsed: Duration::from_secs(600),
        };
        summary.log();
    }
}
