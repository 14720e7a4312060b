//! Operator trait + common interfaces.
//!
//! The exec runtime calls `plan(...)` once per stage to obtain the output
//! schema, then invokes `eval_block(...)` for every batch in input order.

use lazyetl_core::error::{Error as CoreError, PlanError};
use lazyetl_core::prelude::Schema;
use lazyetl_core::types::RowBatch;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    /// `row` is the offending row's index within the batch, when known.
    #[error("execution error: {message}")]
    Exec { row: Option<usize>, message: String },
}

impl OpError {
    pub fn exec(message: impl Into<String>) -> Self {
        OpError::Exec {
            row: None,
            message: message.into(),
        }
    }

    pub fn at_row(row: usize, message: impl Into<String>) -> Self {
        OpError::Exec {
            row: Some(row),
            message: message.into(),
        }
    }

    pub fn row(&self) -> Option<usize> {
        match self {
            OpError::Exec { row, .. } => *row,
            OpError::Plan(_) => None,
        }
    }
}

impl From<CoreError> for OpError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Plan(p) => OpError::Plan(p),
            other => OpError::exec(other.to_string()),
        }
    }
}

/// Trait that all operators implement.
///
/// Invariants:
/// - `eval_block` must be deterministic given the same input.
/// - Output rows keep their relative input order.
/// - The batch `eval_block` returns matches the schema `plan` returned.
pub trait Operator: Send + Sync + 'static {
    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str;

    /// Given the input schema, return the output schema.
    fn plan(&self, input: &Schema) -> Result<Schema, OpError>;

    /// Evaluate one batch.
    fn eval_block(&self, input: RowBatch) -> Result<RowBatch, OpError>;

    /// Row-selecting operators return the keep-mask for `input` so callers
    /// can carry per-row bookkeeping (source line numbers) through the filter.
    fn row_mask(&self, _input: &RowBatch) -> Result<Option<Vec<bool>>, OpError> {
        Ok(None)
    }
}
