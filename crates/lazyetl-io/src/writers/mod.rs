//! Streaming writers.

pub mod parquet;
