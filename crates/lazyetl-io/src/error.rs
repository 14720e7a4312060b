use thiserror::Error;

use lazyetl_core::error::SchemaError;

pub type Result<T> = std::result::Result<T, IoError>;

/// Failures reading sources. All of these stop the run.
#[derive(Debug, Error)]
pub enum IoError {
    /// Bad glob, no matching files, or an unopenable path.
    #[error("source error: {0}")]
    Source(String),

    #[error("csv error in {file} (line {line:?}): {message}")]
    Csv {
        file: String,
        line: Option<u64>,
        message: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("parquet read error: {0}")]
    Parquet(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<parquet::errors::ParquetError> for IoError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        IoError::Parquet(e.to_string())
    }
}

impl From<arrow_schema::ArrowError> for IoError {
    fn from(e: arrow_schema::ArrowError) -> Self {
        IoError::Parquet(e.to_string())
    }
}

/// Failures writing the output file.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot create {path}: {message}")]
    Create { path: String, message: String },

    #[error("write failed: {0}")]
    Write(String),

    #[error("finalize failed: {0}")]
    Finalize(String),
}

impl From<parquet::errors::ParquetError> for SinkError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        SinkError::Write(e.to_string())
    }
}

impl From<arrow_schema::ArrowError> for SinkError {
    fn from(e: arrow_schema::ArrowError) -> Self {
        SinkError::Write(e.to_string())
    }
}
