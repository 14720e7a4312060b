//! Naive lowering: the chain as written, every column read, nothing pushed.
//!
//! Executing this plan is the reference result `rules::optimize` must match.

use lazyetl_core::dag::{LogicalPlan, OptimizedPlan, ScanNode, SinkNode, Stage};
use lazyetl_core::error::PlanError;

use crate::builder::validate;

pub fn lower(plan: &LogicalPlan) -> Result<OptimizedPlan, PlanError> {
    let output_schema = validate(plan)?;
    let (source, schema) = plan.scan();
    let mut stages = Vec::new();
    let mut sink = None;
    for node in plan.chain() {
        match node {
            LogicalPlan::Scan { .. } => {}
            LogicalPlan::Derive { name, expr, .. } => stages.push(Stage::Derive {
                name: name.clone(),
                expr: expr.clone(),
            }),
            LogicalPlan::Filter { predicate, .. } => stages.push(Stage::Filter {
                predicate: predicate.clone(),
            }),
            LogicalPlan::Project { columns, .. } => stages.push(Stage::Project {
                columns: columns.clone(),
            }),
            LogicalPlan::Sink {
                destination,
                compression,
                ..
            } => {
                sink = Some(SinkNode {
                    destination: destination.clone(),
                    compression: *compression,
                })
            }
        }
    }
    Ok(OptimizedPlan {
        scan: ScanNode {
            source: source.to_string(),
            schema: schema.clone(),
            required_columns: schema.names(),
            pushed_predicates: Vec::new(),
        },
        stages,
        output_schema,
        sink,
        dropped_derives: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lazyetl_core::expr::{col, lit};
    use lazyetl_core::schema::{DataType, Field, Schema};

    use crate::builder::PlanBuilder;

    #[test]
    fn keeps_every_step() {
        let schema = Arc::new(
            Schema::try_new(vec![
                Field::new("a", DataType::Int64, false),
                Field::new("b", DataType::Int64, false),
            ])
            .unwrap(),
        );
        let plan = PlanBuilder::scan("s", schema)
            .unwrap()
            .derive_column("unused", col("a") + col("b"))
            .unwrap()
            .filter(col("a").gt(lit(0i64)))
            .unwrap()
            .project(["b"])
            .unwrap()
            .build();
        let naive = lower(&plan).unwrap();
        assert_eq!(naive.scan.required_columns, vec!["a", "b"]);
        assert!(naive.scan.pushed_predicates.is_empty());
        let kinds: Vec<_> = naive.stages.iter().map(Stage::kind).collect();
        assert_eq!(kinds, vec!["derive", "filter", "project"]);
    }
}
