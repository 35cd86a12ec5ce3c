//! fundscape-store: the denormalized research-funding table
//!
//! One record per (field, subfield, funder) leaf, persisted as CSV (topics as
//! embedded JSON) or Parquet (topics as a nested list), and served from a
//! single swappable in-memory snapshot.

pub mod anomaly;
pub mod cache;
pub mod csv_table;
pub mod error;
pub mod parquet_table;
pub mod record;
pub mod table;

pub use anomaly::{find_count_anomalies, CountAnomaly};
pub use cache::TableStore;
pub use error::StoreError;
pub use record::{EmbeddedTopics, MalformedTopics, Record, TopicEntry};
pub use table::{read_table, write_table, Table, TableFormat, TableStats};
