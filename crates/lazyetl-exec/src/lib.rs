#![forbid(unsafe_code)]
//! lazyetl-exec: the pull-based streaming engine, cancellation, and run
//! metrics.
//!
//! `Engine::execute` turns an optimized plan into a lazy batch stream;
//! `Engine::run` drives that stream into the Parquet sink and returns a
//! `RunManifest`.

pub mod cancel;
pub mod metrics;
pub mod runtime;

pub use cancel::CancelToken;
pub use runtime::{BatchStream, Engine, ExecError, Location, StageKind};
