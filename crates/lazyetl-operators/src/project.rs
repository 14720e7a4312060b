//! Project operator: keep the named columns in the given order.

use serde::{Deserialize, Serialize};

use lazyetl_core::error::PlanError;
use lazyetl_core::prelude::Schema;
use lazyetl_core::types::RowBatch;

use crate::traits::{OpError, Operator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub columns: Vec<String>,
}

impl Project {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl Operator for Project {
    fn name(&self) -> &'static str {
        "project"
    }

    fn plan(&self, input: &Schema) -> Result<Schema, OpError> {
        if let Some(missing) = self.columns.iter().find(|c| !input.contains(c)) {
            return Err(PlanError::UnknownReference {
                column: missing.clone(),
                context: "project".into(),
            }
            .into());
        }
        input
            .select(&self.columns)
            .ok_or_else(|| OpError::exec("projection did not resolve"))
    }

    fn eval_block(&self, input: RowBatch) -> Result<RowBatch, OpError> {
        Ok(input.select(&self.columns)?)
    }
}
