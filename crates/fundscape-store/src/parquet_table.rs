//! Parquet codec with a native nested topics column
//!
//! Same columns as the CSV layout, but `topics` is
//! `List<Struct<topic_id, topic_name, topic_works_count>>` instead of text.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use arrow::array::{
    Array, ArrayRef, AsArray, ListArray, RecordBatch, StringArray, StructArray, UInt32Array,
    UInt64Array,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{DataType, Field, Fields, Schema, UInt32Type, UInt64Type};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::StoreError;
use crate::record::{EmbeddedTopics, Record, TopicEntry};

fn topic_fields() -> Fields {
    Fields::from(vec![
        Field::new("topic_id", DataType::Utf8, false),
        Field::new("topic_name", DataType::Utf8, false),
        Field::new("topic_works_count", DataType::UInt64, false),
    ])
}

fn topic_item() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Struct(topic_fields()), false))
}

/// research_data table schema
pub fn schema() -> &'static Arc<Schema> {
    static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
        Arc::new(Schema::new(vec![
            Field::new("field_id", DataType::UInt32, false),
            Field::new("field_name", DataType::Utf8, false),
            Field::new("subfield_id", DataType::UInt32, false),
            Field::new("subfield_name", DataType::Utf8, false),
            Field::new("subfield_works_count", DataType::UInt64, false),
            Field::new("funder_id", DataType::Utf8, false),
            Field::new("funder_name", DataType::Utf8, false),
            Field::new("funder_works_count", DataType::UInt64, false),
            // Null list = topics that were malformed at the source
            Field::new("topics", DataType::List(topic_item()), true),
            Field::new("fetch_date", DataType::Utf8, false),
            Field::new("country_code", DataType::Utf8, false),
            Field::new("year_range", DataType::Utf8, false),
        ]))
    });
    &SCHEMA
}

fn strings<'a>(records: &'a [Record], f: impl Fn(&'a Record) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(records.iter().map(f)))
}

fn topics_array(records: &[Record]) -> Result<ArrayRef, arrow::error::ArrowError> {
    let mut lengths = Vec::with_capacity(records.len());
    let mut valid = Vec::with_capacity(records.len());
    let mut flat: Vec<&TopicEntry> = Vec::new();
    for record in records {
        match record.topics.entries() {
            Ok(entries) => {
                lengths.push(entries.len());
                valid.push(true);
                flat.extend(entries);
            }
            Err(_) => {
                lengths.push(0);
                valid.push(false);
            }
        }
    }

    let values = StructArray::try_new(
        topic_fields(),
        vec![
            Arc::new(StringArray::from_iter_values(
                flat.iter().map(|t| t.topic_id.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                flat.iter().map(|t| t.topic_name.as_str()),
            )),
            Arc::new(UInt64Array::from_iter_values(
                flat.iter().map(|t| t.topic_works_count),
            )),
        ],
        None,
    )?;

    let list = ListArray::try_new(
        topic_item(),
        OffsetBuffer::from_lengths(lengths),
        Arc::new(values),
        Some(NullBuffer::from(valid)),
    )?;
    Ok(Arc::new(list))
}

/// Build a single record batch from all records.
pub fn to_batch(records: &[Record]) -> Result<RecordBatch, arrow::error::ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.field_id))),
        strings(records, |r| r.field_name.as_str()),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.subfield_id))),
        strings(records, |r| r.subfield_name.as_str()),
        Arc::new(UInt64Array::from_iter_values(
            records.iter().map(|r| r.subfield_works_count),
        )),
        strings(records, |r| r.funder_id.as_str()),
        strings(records, |r| r.funder_name.as_str()),
        Arc::new(UInt64Array::from_iter_values(
            records.iter().map(|r| r.funder_works_count),
        )),
        topics_array(records)?,
        strings(records, |r| r.fetch_date.as_str()),
        strings(records, |r| r.country_code.as_str()),
        strings(records, |r| r.year_range.as_str()),
    ];
    RecordBatch::try_new(schema().clone(), columns)
}

/// Write all records as one zstd-compressed row group.
pub fn write_parquet<W: Write + Send>(
    writer: W,
    records: &[Record],
    zstd_level: i32,
) -> Result<(), String> {
    let level = ZstdLevel::try_new(zstd_level).map_err(|e| e.to_string())?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .build();
    let batch = to_batch(records).map_err(|e| e.to_string())?;
    let mut writer =
        ArrowWriter::try_new(writer, schema().clone(), Some(props)).map_err(|e| e.to_string())?;
    writer.write(&batch).map_err(|e| e.to_string())?;
    writer.close().map_err(|e| e.to_string())?;
    Ok(())
}

/// Typed column lookup for one batch
struct Columns<'a> {
    batch: &'a RecordBatch,
}

impl<'a> Columns<'a> {
    fn column(&self, name: &str) -> Result<&'a ArrayRef, String> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| format!("missing column {name}"))
    }

    fn utf8(&self, name: &str) -> Result<&'a StringArray, String> {
        self.column(name)?
            .as_string_opt::<i32>()
            .ok_or_else(|| format!("column {name} is not utf8"))
    }

    fn u32(&self, name: &str) -> Result<&'a UInt32Array, String> {
        self.column(name)?
            .as_primitive_opt::<UInt32Type>()
            .ok_or_else(|| format!("column {name} is not uint32"))
    }

    fn u64(&self, name: &str) -> Result<&'a UInt64Array, String> {
        self.column(name)?
            .as_primitive_opt::<UInt64Type>()
            .ok_or_else(|| format!("column {name} is not uint64"))
    }

    fn topics(&self) -> Result<&'a ListArray, String> {
        self.column("topics")?
            .as_list_opt::<i32>()
            .ok_or_else(|| "column topics is not a list".to_string())
    }
}

fn non_null(array: &dyn Array, name: &str, row: usize) -> Result<(), String> {
    if array.is_null(row) {
        Err(format!("null {name} at row {row}"))
    } else {
        Ok(())
    }
}

fn str_at(array: &StringArray, name: &str, row: usize) -> Result<String, String> {
    non_null(array, name, row)?;
    Ok(array.value(row).to_string())
}

fn topics_at(list: &ListArray, row: usize) -> Result<EmbeddedTopics, String> {
    if list.is_null(row) {
        return Ok(EmbeddedTopics::Malformed {
            raw: String::new(),
            reason: "topics list is null".to_string(),
        });
    }
    let items = list.value(row);
    let items = items
        .as_struct_opt()
        .ok_or_else(|| "topics items are not structs".to_string())?;
    let cols = |name: &str| {
        items
            .column_by_name(name)
            .ok_or_else(|| format!("topics item has no {name}"))
    };
    let ids = cols("topic_id")?
        .as_string_opt::<i32>()
        .ok_or("topic_id is not utf8")?;
    let names = cols("topic_name")?
        .as_string_opt::<i32>()
        .ok_or("topic_name is not utf8")?;
    let counts = cols("topic_works_count")?
        .as_primitive_opt::<UInt64Type>()
        .ok_or("topic_works_count is not uint64")?;

    let topics = (0..items.len())
        .map(|i| TopicEntry {
            topic_id: ids.value(i).to_string(),
            topic_name: names.value(i).to_string(),
            topic_works_count: counts.value(i),
        })
        .collect();
    Ok(EmbeddedTopics::Parsed(topics))
}

fn batch_records(batch: &RecordBatch, out: &mut Vec<Record>) -> Result<(), String> {
    let cols = Columns { batch };
    let field_id = cols.u32("field_id")?;
    let field_name = cols.utf8("field_name")?;
    let subfield_id = cols.u32("subfield_id")?;
    let subfield_name = cols.utf8("subfield_name")?;
    let subfield_works_count = cols.u64("subfield_works_count")?;
    let funder_id = cols.utf8("funder_id")?;
    let funder_name = cols.utf8("funder_name")?;
    let funder_works_count = cols.u64("funder_works_count")?;
    let topics = cols.topics()?;
    let fetch_date = cols.utf8("fetch_date")?;
    let country_code = cols.utf8("country_code")?;
    let year_range = cols.utf8("year_range")?;

    for row in 0..batch.num_rows() {
        non_null(field_id, "field_id", row)?;
        non_null(subfield_id, "subfield_id", row)?;
        non_null(subfield_works_count, "subfield_works_count", row)?;
        non_null(funder_works_count, "funder_works_count", row)?;
        out.push(Record {
            field_id: field_id.value(row),
            field_name: str_at(field_name, "field_name", row)?,
            subfield_id: subfield_id.value(row),
            subfield_name: str_at(subfield_name, "subfield_name", row)?,
            subfield_works_count: subfield_works_count.value(row),
            funder_id: str_at(funder_id, "funder_id", row)?,
            funder_name: str_at(funder_name, "funder_name", row)?,
            funder_works_count: funder_works_count.value(row),
            topics: topics_at(topics, row)?,
            fetch_date: str_at(fetch_date, "fetch_date", row)?,
            country_code: str_at(country_code, "country_code", row)?,
            year_range: str_at(year_range, "year_range", row)?,
        });
    }
    Ok(())
}

/// Read every record from a Parquet table.
pub fn read_parquet(path: &Path) -> Result<Vec<Record>, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|b| b.build())
        .map_err(|e| StoreError::parquet(path, e))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| StoreError::parquet(path, e))?;
        batch_records(&batch, &mut records).map_err(|e| StoreError::parquet(path, e))?;
    }
    Ok(records)
}
