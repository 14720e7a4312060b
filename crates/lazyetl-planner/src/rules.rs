//! Pushdown rewrites: logical chain → `OptimizedPlan`.
//!
//! A single backward walk from the sink carries the set of columns still
//! needed downstream:
//! - derives nobody reads are dropped, the rest trade their name for the
//!   columns their expression references;
//! - filter conjuncts that only touch scan columns move into the scan, the
//!   rest stay in place;
//! - projections keep only what is still needed.
//!
//! Whatever reaches the scan becomes `required_columns`.

use std::collections::BTreeSet;

use lazyetl_core::dag::{LogicalPlan, OptimizedPlan, ScanNode, SinkNode, Stage};
use lazyetl_core::error::PlanError;
use lazyetl_core::expr::Expr;

use crate::builder::validate;

struct Parts<'a> {
    scan: &'a LogicalPlan,
    transforms: Vec<&'a LogicalPlan>,
    sink: Option<SinkNode>,
}

fn split_chain(plan: &LogicalPlan) -> Result<Parts<'_>, PlanError> {
    let mut chain = plan.chain();
    let sink = match chain.last() {
        Some(LogicalPlan::Sink {
            destination,
            compression,
            ..
        }) => Some(SinkNode {
            destination: destination.clone(),
            compression: *compression,
        }),
        _ => None,
    };
    if sink.is_some() {
        chain.pop();
    }
    let mut nodes = chain.into_iter();
    let scan = nodes
        .next()
        .ok_or_else(|| PlanError::InvalidPlan("empty plan".into()))?;
    Ok(Parts {
        scan,
        transforms: nodes.collect(),
        sink,
    })
}

/// Apply predicate and projection pushdown.
pub fn optimize(plan: &LogicalPlan) -> Result<OptimizedPlan, PlanError> {
    let output_schema = validate(plan)?;
    let Parts {
        scan,
        transforms,
        sink,
    } = split_chain(plan)?;
    let LogicalPlan::Scan { source, schema } = scan else {
        return Err(PlanError::InvalidPlan("plan does not start with a scan".into()));
    };

    // derived_before[i]: names some Derive upstream of transform i defines.
    let mut derived_before = Vec::with_capacity(transforms.len());
    let mut derived = BTreeSet::new();
    for node in &transforms {
        derived_before.push(derived.clone());
        if let LogicalPlan::Derive { name, .. } = node {
            derived.insert(name.clone());
        }
    }

    let mut required: BTreeSet<String> = output_schema.names().into_iter().collect();
    let mut stages = Vec::with_capacity(transforms.len());
    let mut pushed: Vec<(usize, Vec<Expr>)> = Vec::new();
    let mut dropped = Vec::new();

    for (i, node) in transforms.iter().enumerate().rev() {
        match node {
            LogicalPlan::Project { columns, .. } => {
                let kept: Vec<String> = columns
                    .iter()
                    .filter(|c| required.contains(*c))
                    .cloned()
                    .collect();
                required = kept.iter().cloned().collect();
                stages.push(Stage::Project { columns: kept });
            }
            LogicalPlan::Derive { name, expr, .. } => {
                if required.remove(name) {
                    expr.collect_columns(&mut required);
                    stages.push(Stage::Derive {
                        name: name.clone(),
                        expr: expr.clone(),
                    });
                } else {
                    dropped.push(name.clone());
                }
            }
            LogicalPlan::Filter { predicate, .. } => {
                let (to_scan, stay): (Vec<Expr>, Vec<Expr>) = predicate
                    .clone()
                    .split_conjuncts()
                    .into_iter()
                    .partition(|c| c.columns().is_disjoint(&derived_before[i]));
                if !to_scan.is_empty() {
                    pushed.push((i, to_scan));
                }
                if let Some(rest) = Expr::conjunction(stay) {
                    rest.collect_columns(&mut required);
                    stages.push(Stage::Filter { predicate: rest });
                }
            }
            other => {
                return Err(PlanError::InvalidPlan(format!(
                    "unexpected {} inside the chain",
                    other.kind()
                )))
            }
        }
    }
    stages.reverse();
    dropped.reverse();
    pushed.sort_by_key(|(i, _)| *i);

    let required_columns = schema
        .fields
        .iter()
        .filter(|f| required.contains(&f.name))
        .map(|f| f.name.clone())
        .collect();

    Ok(OptimizedPlan {
        scan: ScanNode {
            source: source.clone(),
            schema: schema.clone(),
            required_columns,
            pushed_predicates: pushed.into_iter().flat_map(|(_, p)| p).collect(),
        },
        stages,
        output_schema,
        sink,
        dropped_derives: dropped,
    })
}
