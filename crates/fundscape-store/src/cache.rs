//! Process-wide table cache with explicit invalidate-and-reload
//!
//! Holds at most one snapshot. Readers clone the `Arc` under a read lock and
//! work on an immutable table. The file is read and parsed with no lock held;
//! the write lock only covers swapping the `Arc`, so a reader sees the old
//! table or the new one, never a mix, and never waits for a parse.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::table::{read_table, Table};

pub struct TableStore {
    path: PathBuf,
    cache: RwLock<Option<Arc<Table>>>,
}

impl TableStore {
    /// Empty cache; the first [`load`](Self::load) reads `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// Cache pre-filled with an in-memory table.
    pub fn with_table(path: impl Into<PathBuf>, table: Table) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(Some(Arc::new(table))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot, without touching the file.
    pub fn cached(&self) -> Option<Arc<Table>> {
        self.cache.read().clone()
    }

    /// Cached snapshot, or read the table and cache it.
    ///
    /// A failed read leaves the cache empty so the next call retries.
    pub fn load(&self) -> Result<Arc<Table>, StoreError> {
        self.load_with(read_table)
    }

    fn load_with(
        &self,
        read: impl FnOnce(&Path) -> Result<Table, StoreError>,
    ) -> Result<Arc<Table>, StoreError> {
        if let Some(table) = self.cached() {
            return Ok(table);
        }

        let table = Arc::new(read(&self.path)?);
        let mut guard = self.cache.write();
        // A concurrent load or reload may have filled it while we parsed
        if let Some(current) = guard.as_ref() {
            return Ok(Arc::clone(current));
        }
        log::info!(
            "loaded {} records from {}",
            table.len(),
            self.path.display()
        );
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Read the table again and swap it in.
    ///
    /// Until the read finishes, readers keep getting the previous snapshot.
    /// On failure the cache is cleared, so the next request retries the read.
    pub fn invalidate_and_reload(&self) -> Result<Arc<Table>, StoreError> {
        self.reload_with(read_table)
    }

    fn reload_with(
        &self,
        read: impl FnOnce(&Path) -> Result<Table, StoreError>,
    ) -> Result<Arc<Table>, StoreError> {
        match read(&self.path) {
            Ok(table) => {
                let table = Arc::new(table);
                *self.cache.write() = Some(Arc::clone(&table));
                log::info!(
                    "reloaded {} records from {}",
                    table.len(),
                    self.path.display()
                );
                Ok(table)
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("path", &self.path)
            .field("loaded", &self.cache.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use crate::record::Record;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::table::write_table;
    use tempfile::TempDir;

    #[test]
    fn load_reads_once_then_serves_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();

        let store = TableStore::new(&path);
        assert!(store.cached().is_none());
        let first = store.load().unwrap();

        // File changes are invisible until reload
        write_table(&path, &[record(17, 1702, "F1"), record(17, 1702, "F2")], 3).unwrap();
        let second = store.load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn reload_picks_up_new_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();
        let store = TableStore::new(&path);
        let old = store.load().unwrap();

        write_table(&path, &[record(17, 1702, "F1"), record(17, 1702, "F2")], 3).unwrap();
        let new = store.invalidate_and_reload().unwrap();
        assert_eq!(new.len(), 2);
        assert_eq!(store.load().unwrap().len(), 2);
        // Old snapshot is untouched
        assert_eq!(old.len(), 1);
    }

    #[test]
    fn missing_table_is_error_and_stays_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.csv");
        let store = TableStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
        assert!(store.cached().is_none());

        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn failed_reload_clears_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();
        let store = TableStore::new(&path);
        store.load().unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(store.invalidate_and_reload().is_err());
        assert!(store.cached().is_none());
    }

    #[test]
    fn reload_parses_without_holding_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[record(17, 1702, "F1")], 3).unwrap();
        let store = TableStore::new(&path);
        let old = store.load().unwrap();

        write_table(&path, &[record(17, 1702, "F1"), record(17, 1702, "F2")], 3).unwrap();
        let new = store
            .reload_with(|path| {
                // Readers are served the old snapshot while the file is parsed
                assert!(store.cache.try_write().is_some());
                assert!(Arc::ptr_eq(&store.cached().unwrap(), &old));
                read_table(path)
            })
            .unwrap();
        assert!(Arc::ptr_eq(&store.cached().unwrap(), &new));
    }

    #[test]
    fn first_load_parses_without_holding_the_lock() {
        let store = TableStore::new("unused.csv");
        let table = store
            .load_with(|path| {
                assert!(store.cache.try_write().is_some());
                Ok(Table::new(vec![record(17, 1702, "F1")], path))
            })
            .unwrap();
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(&store.cached().unwrap(), &table));
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let small: Vec<Record> = (0..3).map(|i| record(17, 1702, &format!("F{i}"))).collect();
        let large: Vec<Record> = (0..40).map(|i| record(17, 1702, &format!("F{i}"))).collect();
        write_table(&path, &small, 3).unwrap();
        let store = TableStore::new(&path);
        store.load().unwrap();

        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        let table = store.load().unwrap();
                        let len = table.len();
                        assert!(len == small.len() || len == large.len(), "saw {len} rows");
                        assert!(table.records().iter().all(|r| r.field_id == 17));
                    }
                });
            }
            for round in 0..20 {
                let records = if round % 2 == 0 { &large } else { &small };
                write_table(&path, records, 3).unwrap();
                assert_eq!(store.invalidate_and_reload().unwrap().len(), records.len());
            }
            done.store(true, Ordering::Relaxed);
        });

        write_table(&path, &large, 3).unwrap();
        store.invalidate_and_reload().unwrap();
        assert_eq!(store.load().unwrap().len(), large.len());
    }

    #[test]
    fn with_table_needs_no_file() {
        let store = TableStore::with_table("nowhere.csv", Table::new(vec![record(17, 1702, "F1")], "mem"));
        assert_eq!(store.load().unwrap().len(), 1);
        store.invalidate();
        assert!(store.load().is_err());
    }
}
