#![forbid(unsafe_code)]
//! lazyetl-core: shared vocabulary for the lazy CSV → Parquet pipeline.
//!
//! This crate is pure data plus validation: the schema registry, typed
//! values and batches, the expression tree with its type checker, the
//! logical/optimized plan nodes, configs, and run manifests. It performs no
//! I/O; readers, writers, and the runtime live in the other crates.

pub mod config;
pub mod dag;
pub mod error;
pub mod expr;
pub mod hash;
pub mod manifest;
pub mod prelude;
pub mod schema;
pub mod types;

/// Engine version string stamped into run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
