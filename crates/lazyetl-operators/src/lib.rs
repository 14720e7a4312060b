#![forbid(unsafe_code)]
//! lazyetl-operators: the closed set of row-preserving transforms.
//!
//! Design intent:
//! - Pure and synchronous; one `RowBatch` in, one out.
//! - `plan(...)` re-derives the output schema so the engine can check that
//!   every stage agrees with the optimizer before the first batch is pulled.
//! - Expression evaluation lives in `eval` and is shared by derive and filter.

pub mod derive;
pub mod eval;
pub mod filter;
pub mod project;
pub mod traits;

pub use derive::Derive;
pub use filter::Filter;
pub use project::Project;
pub use traits::{OpError, Operator};
