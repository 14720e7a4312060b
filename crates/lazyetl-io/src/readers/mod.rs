//! Streaming readers.
//!
//! `csv` feeds the pipeline; `parquet` reads finished output files back.

pub mod csv;
pub mod parquet;
