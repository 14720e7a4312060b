#![forbid(unsafe_code)]
//! lazyetl-io: the two ends of the pipeline.
//!
//! - `readers::csv` expands a source glob and streams typed `RowBatch`
//!   chunks, one file at a time, skipping rows that fail typing.
//! - `writers::parquet` streams batches into a single Parquet file through
//!   the Arrow writer and publishes it atomically on `finish`.
//! - `readers::parquet` reads an output file back for inspection and tests.

pub mod arrow;
pub mod error;
pub mod readers;
pub mod writers;

pub use error::{IoError, SinkError};
pub use readers::csv::{CsvScanner, ScanChunk, ScanOptions, ScanStats};
pub use writers::parquet::{ParquetSink, SinkOptions};
