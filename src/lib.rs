#![forbid(unsafe_code)]
//! lazyetl: lazy, streaming CSV to Parquet ETL.
//!
//! This crate only re-exports the workspace members; see each for details.

pub use lazyetl_core as core;
pub use lazyetl_exec as exec;
pub use lazyetl_io as io;
pub use lazyetl_operators as operators;
pub use lazyetl_planner as planner;
