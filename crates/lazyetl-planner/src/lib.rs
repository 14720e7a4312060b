#![forbid(unsafe_code)]
//! lazyetl-planner: from builder calls or YAML pipelines → `LogicalPlan`
//! → `OptimizedPlan` with predicate and projection pushdown.
//!
//! Design:
//! - We reuse `lazyetl-core::dag::{LogicalPlan, OptimizedPlan}` node types.
//! - This crate adds:
//!     * a fluent `PlanBuilder` that type-checks every step
//!     * the pushdown pass (`rules::optimize`) and a naive `lower` used as
//!       the reference for equivalence
//!     * text EXPLAIN output
//!     * YAML DSL → `LogicalPlan`
//!     * the two NYC yellow-taxi pipeline presets
//!
//! No I/O happens here.

pub mod builder;
pub mod dsl;
pub mod explain;
pub mod lower;
pub mod presets;
pub mod rules;

pub use builder::{validate, PlanBuilder};
pub use dsl::yaml::{parse_yaml_pipeline, DslError, ParsedPipeline};
pub use explain::{explain_logical, explain_optimized, LogicalExplain, OptimizedExplain};
pub use lower::lower;
pub use presets::{trip_schema, Preset};
pub use rules::optimize;
