//! Read finished Parquet output back: footer summary and batches.

use std::fs::File;
use std::path::Path;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;

use lazyetl_core::schema::Schema;
use lazyetl_core::types::RowBatch;

use crate::arrow::from_record_batch;
use crate::error::{IoError, Result};
use crate::writers::parquet::SCHEMA_METADATA_KEY;

/// What the footer says about a file.
#[derive(Debug, Clone, Serialize)]
pub struct ParquetSummary {
    /// Schema recorded by the sink, if the file came from one.
    pub schema: Option<Schema>,
    pub num_rows: u64,
    pub row_groups: usize,
    /// Rows per row group, in file order.
    pub row_group_rows: Vec<u64>,
    pub created_by: Option<String>,
    /// Codec of each column chunk in the first row group.
    pub compression: Vec<String>,
}

fn builder(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path)
        .map_err(|e| IoError::Source(format!("cannot open {}: {e}", path.display())))?;
    Ok(ParquetRecordBatchReaderBuilder::try_new(file)?)
}

pub fn inspect(path: impl AsRef<Path>) -> Result<ParquetSummary> {
    let builder = builder(path.as_ref())?;
    let meta = builder.metadata();
    let file_meta = meta.file_metadata();
    let schema = file_meta
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == SCHEMA_METADATA_KEY))
        .and_then(|kv| kv.value.as_deref())
        .map(serde_json::from_str::<Schema>)
        .transpose()
        .map_err(|e| IoError::Parquet(format!("bad {SCHEMA_METADATA_KEY} entry: {e}")))?;
    let row_group_rows: Vec<u64> = meta
        .row_groups()
        .iter()
        .map(|rg| rg.num_rows().max(0) as u64)
        .collect();
    let compression = meta
        .row_groups()
        .first()
        .map(|rg| {
            rg.columns()
                .iter()
                .map(|c| c.compression().to_string())
                .collect()
        })
        .unwrap_or_default();
    Ok(ParquetSummary {
        schema,
        num_rows: file_meta.num_rows().max(0) as u64,
        row_groups: meta.num_row_groups(),
        row_group_rows,
        created_by: file_meta.created_by().map(str::to_string),
        compression,
    })
}

/// Arrow schema and every record batch in the file.
pub fn read_record_batches(path: impl AsRef<Path>) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = builder(path.as_ref())?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Every row of a sink-written file, typed by its embedded schema.
pub fn read_rows(path: impl AsRef<Path>) -> Result<(Schema, Vec<RowBatch>)> {
    let path = path.as_ref();
    let schema = inspect(path)?.schema.ok_or_else(|| {
        IoError::Parquet(format!(
            "{} has no {SCHEMA_METADATA_KEY} footer entry",
            path.display()
        ))
    })?;
    let (_, batches) = read_record_batches(path)?;
    let rows = batches
        .iter()
        .map(|rb| from_record_batch(rb, &schema))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, rows))
}
