//! Parquet sink built on the Arrow writer.
//!
//! Bytes are written to `<destination>.inprogress` and renamed onto the
//! destination by `finish`. Dropping an unfinished sink removes the temporary
//! file, so a failed run never leaves a truncated output behind and never
//! disturbs a previous one.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow_schema::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression as ParquetCompression, GzipLevel, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::{info, warn};

use lazyetl_core::dag::Compression;
use lazyetl_core::schema::Schema;
use lazyetl_core::types::RowBatch;

use crate::arrow::{arrow_schema, to_record_batch};
use crate::error::SinkError;

/// Footer key holding the output schema as JSON.
pub const SCHEMA_METADATA_KEY: &str = "lazyetl.schema";

const IN_PROGRESS_SUFFIX: &str = ".inprogress";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    pub compression: Compression,
    /// Upper bound on rows per row group.
    pub row_group_rows: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            row_group_rows: 1_048_576,
        }
    }
}

pub fn parquet_compression(c: Compression) -> ParquetCompression {
    match c {
        Compression::Uncompressed => ParquetCompression::UNCOMPRESSED,
        Compression::Snappy => ParquetCompression::SNAPPY,
        Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
        Compression::Lz4 => ParquetCompression::LZ4_RAW,
        Compression::Gzip => ParquetCompression::GZIP(GzipLevel::default()),
    }
}

fn in_progress_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(IN_PROGRESS_SUFFIX);
    PathBuf::from(name)
}

pub struct ParquetSink {
    destination: PathBuf,
    temp: PathBuf,
    schema: Schema,
    arrow_schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    rows: u64,
}

impl ParquetSink {
    pub fn create(
        destination: impl AsRef<Path>,
        schema: &Schema,
        opts: SinkOptions,
    ) -> Result<Self, SinkError> {
        let destination = destination.as_ref().to_path_buf();
        let temp = in_progress_path(&destination);
        let create_err = |message: String| SinkError::Create {
            path: destination.display().to_string(),
            message,
        };
        if opts.row_group_rows == 0 {
            return Err(create_err("row_group_rows must be at least 1".into()));
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| create_err(e.to_string()))?;
        }

        let schema_json =
            serde_json::to_string(schema).map_err(|e| create_err(e.to_string()))?;
        let props = WriterProperties::builder()
            .set_compression(parquet_compression(opts.compression))
            .set_max_row_group_size(opts.row_group_rows)
            .set_created_by(format!("lazyetl {}", lazyetl_core::VERSION))
            .set_key_value_metadata(Some(vec![KeyValue::new(
                SCHEMA_METADATA_KEY.to_string(),
                Some(schema_json),
            )]))
            .build();

        let arrow_schema = arrow_schema(schema);
        let file = File::create(&temp).map_err(|e| create_err(e.to_string()))?;
        let writer = ArrowWriter::try_new(file, arrow_schema.clone(), Some(props))
            .map_err(|e| create_err(e.to_string()))?;
        info!(
            destination = %destination.display(),
            compression = %opts.compression,
            columns = schema.len(),
            "opened parquet sink"
        );
        Ok(Self {
            destination,
            temp,
            schema: schema.clone(),
            arrow_schema,
            writer: Some(writer),
            rows: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Append one batch. Its columns may arrive in any order; missing ones fail.
    pub fn write_batch(&mut self, batch: &RowBatch) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Write("sink already finished".into()))?;
        if batch.is_empty() {
            return Ok(());
        }
        for (field, col) in self.schema.fields.iter().filter_map(|f| {
            batch.column(&f.name).map(|c| (f, c))
        }) {
            if col.data_type != field.data_type {
                return Err(SinkError::Write(format!(
                    "column '{}' is {}, sink expects {}",
                    field.name, col.data_type, field.data_type
                )));
            }
        }
        let rb = to_record_batch(batch, self.arrow_schema.clone())?;
        writer.write(&rb)?;
        self.rows += batch.num_rows() as u64;
        Ok(())
    }

    /// Flush the footer and publish the file. Returns the rows written.
    pub fn finish(mut self) -> Result<u64, SinkError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| SinkError::Finalize("sink already finished".into()))?;
        let meta = writer
            .close()
            .map_err(|e| SinkError::Finalize(e.to_string()))?;
        fs::rename(&self.temp, &self.destination).map_err(|e| {
            SinkError::Finalize(format!(
                "rename {} -> {}: {e}",
                self.temp.display(),
                self.destination.display()
            ))
        })?;
        info!(
            destination = %self.destination.display(),
            rows = self.rows,
            row_groups = meta.row_groups.len(),
            "parquet sink finished"
        );
        // Renamed away; nothing left for Drop to clean.
        self.temp = PathBuf::new();
        Ok(self.rows)
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if self.temp.as_os_str().is_empty() {
            return;
        }
        drop(self.writer.take());
        match fs::remove_file(&self.temp) {
            Ok(()) => warn!(path = %self.temp.display(), "discarded unfinished output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.temp.display(), error = %e, "could not remove unfinished output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazyetl_core::schema::{DataType, Field};
    use lazyetl_core::types::{Column, Scalar};

    fn schema() -> Schema {
        Schema::try_new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("d", DataType::Duration, true),
        ])
        .unwrap()
    }

    fn batch() -> RowBatch {
        RowBatch::try_new(vec![
            Column::new("id", DataType::Int64, vec![Scalar::I64(1), Scalar::I64(2)]),
            Column::new(
                "d",
                DataType::Duration,
                vec![Scalar::Duration(10), Scalar::Null],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn finish_publishes_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out/trips.parquet");
        let mut sink = ParquetSink::create(&dest, &schema(), SinkOptions::default()).unwrap();
        sink.write_batch(&batch()).unwrap();
        assert!(in_progress_path(&dest).exists());
        assert!(!dest.exists());
        assert_eq!(sink.finish().unwrap(), 2);
        assert!(dest.exists());
        assert!(!in_progress_path(&dest).exists());
    }

    #[test]
    fn drop_without_finish_leaves_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("trips.parquet");
        fs::write(&dest, b"previous").unwrap();
        {
            let mut sink = ParquetSink::create(&dest, &schema(), SinkOptions::default()).unwrap();
            sink.write_batch(&batch()).unwrap();
        }
        assert!(!in_progress_path(&dest).exists());
        assert_eq!(fs::read(&dest).unwrap(), b"previous");
    }

    #[test]
    fn mistyped_batch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ParquetSink::create(
            dir.path().join("x.parquet"),
            &schema(),
            SinkOptions::default(),
        )
        .unwrap();
        let bad = RowBatch::try_new(vec![
            Column::new("id", DataType::Float64, vec![Scalar::F64(1.0)]),
            Column::new("d", DataType::Duration, vec![Scalar::Null]),
        ])
        .unwrap();
        assert!(matches!(sink.write_batch(&bad), Err(SinkError::Write(_))));
    }
}
