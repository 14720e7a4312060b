//! Convenient re-exports for downstream crates.

pub use crate::config::{ConfigOverrides, EngineConfig};
pub use crate::dag::{Compression, LogicalPlan, OptimizedPlan, ScanNode, SinkNode, Stage};
pub use crate::error::{Error, PlanError, Result, SchemaError};
pub use crate::expr::{col, lit, ArithOp, CmpOp, DatePart, Expr};
pub use crate::manifest::{ManifestId, RunManifest, RunStats};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Column, RowBatch, Scalar};
