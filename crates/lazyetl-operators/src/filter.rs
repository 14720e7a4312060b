//! Filter operator: keep the rows whose boolean predicate is `true`.

use serde::{Deserialize, Serialize};

use lazyetl_core::expr::Expr;
use lazyetl_core::prelude::{DataType, Schema};
use lazyetl_core::types::RowBatch;

use crate::eval::evaluate_mask;
use crate::traits::{OpError, Operator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub predicate: Expr,
}

impl Filter {
    pub fn new(predicate: Expr) -> Self {
        Self { predicate }
    }
}

impl Operator for Filter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn plan(&self, input: &Schema) -> Result<Schema, OpError> {
        let (ty, _) = self.predicate.resolve(input, "filter")?;
        if ty != DataType::Boolean {
            return Err(OpError::Plan(lazyetl_core::error::PlanError::TypeMismatch {
                context: "filter".into(),
                message: format!("predicate is {ty}, expected Boolean"),
            }));
        }
        Ok(input.clone())
    }

    fn eval_block(&self, input: RowBatch) -> Result<RowBatch, OpError> {
        let mask = evaluate_mask(&self.predicate, &input)?;
        Ok(input.filter(&mask)?)
    }

    fn row_mask(&self, input: &RowBatch) -> Result<Option<Vec<bool>>, OpError> {
        evaluate_mask(&self.predicate, input).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazyetl_core::expr::{col, lit};
    use lazyetl_core::prelude::Field;
    use lazyetl_core::types::{Column, Scalar};

    #[test]
    fn keeps_matching_rows_in_order() {
        let batch = RowBatch::try_new(vec![Column::new(
            "passenger_count",
            DataType::Int64,
            vec![Scalar::I64(3), Scalar::I64(1), Scalar::I64(2), Scalar::Null],
        )])
        .unwrap();
        let f = Filter::new(col("passenger_count").gt(lit(1i64)));
        let out = f.eval_block(batch).unwrap();
        assert_eq!(out.columns[0].values, vec![Scalar::I64(3), Scalar::I64(2)]);
    }

    #[test]
    fn non_boolean_predicate_rejected_at_plan() {
        let schema = Schema::try_new(vec![Field::new("a", DataType::Int64, false)]).unwrap();
        let f = Filter::new(col("a"));
        assert!(matches!(f.plan(&schema), Err(OpError::Plan(_))));
    }
}
