//! Human-readable plan rendering for `lazyetl explain`.

use std::fmt;

use lazyetl_core::dag::{LogicalPlan, OptimizedPlan, Stage};

/// Logical plan, sink at the top and the scan innermost.
pub struct LogicalExplain<'a>(pub &'a LogicalPlan);

/// Optimized plan in execution order, with the pushdown annotations.
pub struct OptimizedExplain<'a>(pub &'a OptimizedPlan);

pub fn explain_logical(plan: &LogicalPlan) -> String {
    LogicalExplain(plan).to_string()
}

pub fn explain_optimized(plan: &OptimizedPlan) -> String {
    OptimizedExplain(plan).to_string()
}

impl fmt::Display for LogicalExplain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut cur = Some(self.0);
        while let Some(node) = cur {
            let pad = "  ".repeat(depth);
            match node {
                LogicalPlan::Scan { source, schema } => {
                    writeln!(f, "{pad}Scan: {source} [{} columns]", schema.len())?
                }
                LogicalPlan::Derive { name, expr, .. } => {
                    writeln!(f, "{pad}Derive: {name} = {expr}")?
                }
                LogicalPlan::Filter { predicate, .. } => writeln!(f, "{pad}Filter: {predicate}")?,
                LogicalPlan::Project { columns, .. } => {
                    writeln!(f, "{pad}Project: {}", columns.join(", "))?
                }
                LogicalPlan::Sink {
                    destination,
                    compression,
                    ..
                } => writeln!(f, "{pad}Sink: {destination} [{compression}]")?,
            }
            depth += 1;
            cur = node.input();
        }
        Ok(())
    }
}

impl fmt::Display for OptimizedExplain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.0;
        let scan = &plan.scan;
        writeln!(f, "Scan: {}", scan.source)?;
        writeln!(
            f,
            "  read: {} of {} columns: {}",
            scan.read_columns().len(),
            scan.schema.len(),
            scan.read_columns().join(", ")
        )?;
        writeln!(f, "  required: {}", scan.required_columns.join(", "))?;
        match scan.pushed_predicate() {
            Some(p) => writeln!(f, "  pushed: {p}")?,
            None => writeln!(f, "  pushed: none")?,
        }
        for (i, stage) in plan.stages.iter().enumerate() {
            let n = i + 1;
            match stage {
                Stage::Derive { name, expr } => writeln!(f, "{n}. Derive: {name} = {expr}")?,
                Stage::Filter { predicate } => writeln!(f, "{n}. Filter: {predicate}")?,
                Stage::Project { columns } => writeln!(f, "{n}. Project: {}", columns.join(", "))?,
            }
        }
        if !plan.dropped_derives.is_empty() {
            writeln!(f, "Dropped derives: {}", plan.dropped_derives.join(", "))?;
        }
        let cols: Vec<String> = plan
            .output_schema
            .fields
            .iter()
            .map(|field| format!("{}:{}", field.name, field.data_type))
            .collect();
        writeln!(f, "Output: {}", cols.join(", "))?;
        if let Some(sink) = &plan.sink {
            writeln!(f, "Sink: {} [{}]", sink.destination, sink.compression)?;
        }
        Ok(())
    }
}
