//! CSV codec: header row plus one line per record, topics as JSON text

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use crate::error::StoreError;
use crate::record::Record;

/// Read every record from a CSV table.
///
/// Scalar columns are strict: one bad row fails the read. Topic cells
/// are lenient, see [`EmbeddedTopics`](crate::EmbeddedTopics).
pub fn read_csv(path: &Path) -> Result<Vec<Record>, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<Record>().enumerate() {
        let record = row.map_err(|source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(e) = record.topics.entries() {
            // Header is line 1
            log::warn!("{}: line {}: {e}", path.display(), idx + 2);
        }
        records.push(record);
    }
    Ok(records)
}

/// Write records with a header row.
pub fn write_csv<W: Write>(writer: W, records: &[Record]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}
