//! Error type for reading and writing the persisted table

use std::path::PathBuf;

/// Why the table could not be read or written.
///
/// Every read variant means the data is unavailable to the server.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("table is empty: {}", .0.display())]
    Empty(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV table {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed Parquet table {}: {message}", path.display())]
    Parquet { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub(crate) fn parquet(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Parquet {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}
