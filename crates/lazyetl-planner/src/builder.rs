//! Fluent construction of linear `LogicalPlan`s.
//!
//! Each step is checked against the schema visible at that point, so a plan
//! that leaves the builder always type-checks end to end.

use std::collections::HashSet;
use std::sync::Arc;

use lazyetl_core::dag::{Compression, LogicalPlan};
use lazyetl_core::error::PlanError;
use lazyetl_core::expr::Expr;
use lazyetl_core::schema::{DataType, Schema};

#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: LogicalPlan,
    schema: Schema,
}

impl PlanBuilder {
    pub fn scan(source: impl Into<String>, schema: Arc<Schema>) -> Result<Self, PlanError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(PlanError::InvalidPlan("scan source is empty".into()));
        }
        if schema.is_empty() {
            return Err(PlanError::InvalidPlan("scan schema has no columns".into()));
        }
        // A deserialized schema may not have gone through `Schema::try_new`.
        Schema::try_new(schema.fields.clone())?;
        if let Some(bad) = schema.fields.iter().find(|f| !f.data_type.is_source_type()) {
            return Err(PlanError::TypeMismatch {
                context: "scan".into(),
                message: format!(
                    "column '{}' declares {}, sources carry Int64, Float64, Utf8 or Timestamp",
                    bad.name, bad.data_type
                ),
            });
        }
        Ok(Self {
            schema: schema.as_ref().clone(),
            plan: LogicalPlan::Scan { source, schema },
        })
    }

    /// Columns visible after the steps so far.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Add `name = expr`. An existing column of that name is replaced in place.
    pub fn derive_column(self, name: impl Into<String>, expr: Expr) -> Result<Self, PlanError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PlanError::InvalidPlan("derived column needs a name".into()));
        }
        let field = expr.to_field(&name, &self.schema, &format!("derive '{name}'"))?;
        Ok(Self {
            schema: self.schema.with_field(field),
            plan: LogicalPlan::Derive {
                input: Box::new(self.plan),
                name,
                expr,
            },
        })
    }

    pub fn filter(self, predicate: Expr) -> Result<Self, PlanError> {
        let (ty, _) = predicate.resolve(&self.schema, "filter")?;
        if ty != DataType::Boolean {
            return Err(PlanError::TypeMismatch {
                context: "filter".into(),
                message: format!("predicate `{predicate}` is {ty}, expected Boolean"),
            });
        }
        Ok(Self {
            schema: self.schema,
            plan: LogicalPlan::Filter {
                input: Box::new(self.plan),
                predicate,
            },
        })
    }

    pub fn project<I, S>(self, columns: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(PlanError::InvalidPlan("projection selects no columns".into()));
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(PlanError::DuplicateColumn(c.clone()));
            }
            if !self.schema.contains(c) {
                return Err(PlanError::UnknownReference {
                    column: c.clone(),
                    context: "project".into(),
                });
            }
        }
        let schema = self
            .schema
            .select(&columns)
            .ok_or_else(|| PlanError::InvalidPlan("projection did not resolve".into()))?;
        Ok(Self {
            schema,
            plan: LogicalPlan::Project {
                input: Box::new(self.plan),
                columns,
            },
        })
    }

    pub fn sink(
        self,
        destination: impl Into<String>,
        compression: Compression,
    ) -> Result<LogicalPlan, PlanError> {
        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(PlanError::InvalidPlan("sink destination is empty".into()));
        }
        Ok(LogicalPlan::Sink {
            input: Box::new(self.plan),
            destination,
            compression,
        })
    }

    /// Finish without a sink; the engine can still stream the result.
    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}

/// Re-check a plan that did not come from the builder (e.g. deserialized).
///
/// Returns the plan's output schema.
pub fn validate(plan: &LogicalPlan) -> Result<Schema, PlanError> {
    let chain = plan.chain();
    let mut builder: Option<PlanBuilder> = None;
    let last = chain.len().saturating_sub(1);
    for (i, node) in chain.into_iter().enumerate() {
        builder = Some(match (node, builder) {
            (LogicalPlan::Scan { source, schema }, None) => {
                PlanBuilder::scan(source.clone(), schema.clone())?
            }
            (LogicalPlan::Derive { name, expr, .. }, Some(b)) => {
                b.derive_column(name.clone(), expr.clone())?
            }
            (LogicalPlan::Filter { predicate, .. }, Some(b)) => b.filter(predicate.clone())?,
            (LogicalPlan::Project { columns, .. }, Some(b)) => b.project(columns.iter().cloned())?,
            (LogicalPlan::Sink { destination, .. }, Some(b)) if i == last => {
                if destination.trim().is_empty() {
                    return Err(PlanError::InvalidPlan("sink destination is empty".into()));
                }
                b
            }
            (node, _) => {
                return Err(PlanError::InvalidPlan(format!(
                    "unexpected {} at position {i}",
                    node.kind()
                )))
            }
        });
    }
    builder
        .map(|b| b.schema)
        .ok_or_else(|| PlanError::InvalidPlan("empty plan".into()))
}
