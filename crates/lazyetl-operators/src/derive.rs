//! Derive operator: append (or replace) one computed column.

use serde::{Deserialize, Serialize};

use lazyetl_core::expr::Expr;
use lazyetl_core::prelude::Schema;
use lazyetl_core::types::{Column, RowBatch};

use crate::eval::evaluate;
use crate::traits::{OpError, Operator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derive {
    pub name: String,
    pub expr: Expr,
}

impl Derive {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

impl Operator for Derive {
    fn name(&self) -> &'static str {
        "derive"
    }

    fn plan(&self, input: &Schema) -> Result<Schema, OpError> {
        let context = format!("derive '{}'", self.name);
        let field = self.expr.to_field(&self.name, input, &context)?;
        Ok(input.with_field(field))
    }

    fn eval_block(&self, input: RowBatch) -> Result<RowBatch, OpError> {
        let values = evaluate(&self.expr, &input)?;
        // Type follows the batch's own columns; nullability is irrelevant here.
        let (data_type, _) = self.expr.resolve(&input.schema(), &self.name)?;
        Ok(input.with_column(Column::new(self.name.clone(), data_type, values))?)
    }
}
