//! Immutable table snapshot plus format-dispatching read/write

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::anomaly::find_count_anomalies;
use crate::csv_table::{read_csv, write_csv};
use crate::error::StoreError;
use crate::parquet_table::{read_parquet, write_parquet};
use crate::record::Record;

/// On-disk layout, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    /// `.parquet` → Parquet, anything else → CSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => Self::Parquet,
            _ => Self::Csv,
        }
    }
}

/// Summary numbers reported by `/api/health` and `fundscape inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub total: usize,
    pub fields: usize,
    pub subfields: usize,
    pub funders: usize,
    pub malformed_topic_rows: usize,
    pub anomalies: usize,
    pub fetch_date: Option<String>,
    pub country_code: Option<String>,
    pub year_range: Option<String>,
}

/// One loaded table. Never mutated after construction.
#[derive(Debug)]
pub struct Table {
    records: Vec<Record>,
    source: PathBuf,
    loaded_at: DateTime<Utc>,
}

impl Table {
    pub fn new(records: Vec<Record>, source: impl Into<PathBuf>) -> Self {
        Self {
            records,
            source: source.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn stats(&self) -> TableStats {
        let first = self.records.first();
        TableStats {
            total: self.records.len(),
            fields: distinct(&self.records, |r| r.field_id),
            subfields: distinct(&self.records, |r| r.subfield_id),
            funders: distinct(&self.records, |r| r.funder_id.as_str()),
            malformed_topic_rows: self
                .records
                .iter()
                .filter(|r| r.topics.is_malformed())
                .count(),
            anomalies: find_count_anomalies(&self.records).len(),
            fetch_date: first.map(|r| r.fetch_date.clone()),
            country_code: first.map(|r| r.country_code.clone()),
            year_range: first.map(|r| r.year_range.clone()),
        }
    }
}

fn distinct<'a, K: Eq + std::hash::Hash>(records: &'a [Record], key: impl Fn(&'a Record) -> K) -> usize {
    records.iter().map(key).collect::<HashSet<_>>().len()
}

/// Read a table, failing with [`StoreError::Empty`] when it has no rows.
pub fn read_table(path: &Path) -> Result<Table, StoreError> {
    let records = match TableFormat::from_path(path) {
        TableFormat::Csv => read_csv(path)?,
        TableFormat::Parquet => read_parquet(path)?,
    };
    if records.is_empty() {
        return Err(StoreError::Empty(path.to_path_buf()));
    }
    log::debug!("read {} records from {}", records.len(), path.display());
    Ok(Table::new(records, path))
}

/// Write a table atomically: `<path>.tmp` first, then rename over `path`.
///
/// `zstd_level` only applies to Parquet output.
pub fn write_table(path: &Path, records: &[Record], zstd_level: i32) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    let written = match TableFormat::from_path(path) {
        TableFormat::Csv => write_csv(BufWriter::new(file), records).map_err(|source| {
            StoreError::Csv {
                path: path.to_path_buf(),
                source,
            }
        }),
        TableFormat::Parquet => {
            write_parquet(file, records, zstd_level).map_err(|e| StoreError::parquet(path, e))
        }
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;
    log::info!("wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EmbeddedTopics;
    use crate::record::tests::record;
    use tempfile::TempDir;

    #[test]
    fn format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a.csv")), TableFormat::Csv);
        assert_eq!(
            TableFormat::from_path(Path::new("a.PARQUET")),
            TableFormat::Parquet
        );
        assert_eq!(TableFormat::from_path(Path::new("noext")), TableFormat::Csv);
    }

    #[test]
    fn write_and_read_both_formats() {
        let dir = TempDir::new().unwrap();
        let records = vec![record(17, 1702, "F1"), record(22, 2207, "F2")];
        for name in ["t.csv", "t.parquet"] {
            let path = dir.path().join(name);
            write_table(&path, &records, 3).unwrap();
            let table = read_table(&path).unwrap();
            assert_eq!(table.records(), records.as_slice());
            assert_eq!(table.source(), path.as_path());
        }
    }

    #[test]
    fn write_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("t.csv");
        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("data").join("t.csv.tmp").exists());
    }

    #[test]
    fn write_replaces_existing_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();
        write_table(&path, &[record(17, 1702, "F1"), record(17, 1702, "F2")], 3).unwrap();
        assert_eq!(read_table(&path).unwrap().len(), 2);
    }

    #[test]
    fn empty_table_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(read_table(&path), Err(StoreError::Empty(_))));
    }

    #[test]
    fn stats_count_distinct_ids() {
        let mut bad = record(17, 1705, "F3");
        bad.topics = EmbeddedTopics::parse("nope");
        let table = Table::new(
            vec![
                record(17, 1702, "F1"),
                record(17, 1702, "F2"),
                record(22, 2207, "F1"),
                bad,
            ],
            "mem",
        );
        let stats = table.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.fields, 2);
        assert_eq!(stats.subfields, 3);
        assert_eq!(stats.funders, 3);
        assert_eq!(stats.malformed_topic_rows, 1);
        assert_eq!(stats.anomalies, 0);
        assert_eq!(stats.fetch_date.as_deref(), Some("2025-06-01 12:00:00"));
    }
}
