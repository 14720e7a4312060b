//! Logical and optimized pipeline representations.
//!
//! The planner builds a `LogicalPlan` (what to do, sink last), then flattens
//! it into an `OptimizedPlan` (scan first, with pushdown annotations) that the
//! engine executes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::expr::Expr;
use crate::schema::Schema;

/// Parquet page compression for the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Uncompressed,
    #[default]
    Snappy,
    Zstd,
    Lz4,
    Gzip,
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::Uncompressed => "uncompressed",
            Compression::Snappy => "snappy",
            Compression::Zstd => "zstd",
            Compression::Lz4 => "lz4",
            Compression::Gzip => "gzip",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uncompressed" | "none" => Ok(Compression::Uncompressed),
            "snappy" => Ok(Compression::Snappy),
            "zstd" => Ok(Compression::Zstd),
            "lz4" => Ok(Compression::Lz4),
            "gzip" => Ok(Compression::Gzip),
            other => Err(format!("unknown compression codec '{other}'")),
        }
    }
}

/// High-level logical nodes (scan → transforms → sink).
///
/// Every non-scan node owns exactly one upstream, so a plan is a linear chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalPlan {
    Scan {
        source: String, // glob, e.g. "data/nycyellotaxi/*.csv"
        schema: Arc<Schema>,
    },
    Derive {
        input: Box<LogicalPlan>,
        name: String,
        expr: Expr,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    Project {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    Sink {
        input: Box<LogicalPlan>,
        destination: String,
        compression: Compression,
    },
}

impl LogicalPlan {
    pub fn input(&self) -> Option<&LogicalPlan> {
        use LogicalPlan::*;
        match self {
            Scan { .. } => None,
            Derive { input, .. }
            | Filter { input, .. }
            | Project { input, .. }
            | Sink { input, .. } => Some(input),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogicalPlan::Scan { .. } => "scan",
            LogicalPlan::Derive { .. } => "derive",
            LogicalPlan::Filter { .. } => "filter",
            LogicalPlan::Project { .. } => "project",
            LogicalPlan::Sink { .. } => "sink",
        }
    }

    /// Nodes in execution order, scan first.
    pub fn chain(&self) -> Vec<&LogicalPlan> {
        let mut nodes = Vec::new();
        let mut cur = Some(self);
        while let Some(node) = cur {
            nodes.push(node);
            cur = node.input();
        }
        nodes.reverse();
        nodes
    }

    /// The scan at the root of the chain.
    pub fn scan(&self) -> (&str, &Arc<Schema>) {
        use LogicalPlan::*;
        match self {
            Scan { source, schema } => (source, schema),
            Derive { input, .. }
            | Filter { input, .. }
            | Project { input, .. }
            | Sink { input, .. } => input.scan(),
        }
    }

    pub fn sink(&self) -> Option<(&str, Compression)> {
        match self {
            LogicalPlan::Sink {
                destination,
                compression,
                ..
            } => Some((destination, *compression)),
            _ => None,
        }
    }

    /// Schema produced by this node.
    pub fn output_schema(&self) -> Result<Schema, PlanError> {
        match self {
            LogicalPlan::Scan { schema, .. } => Ok(schema.as_ref().clone()),
            LogicalPlan::Derive { input, name, expr } => {
                let upstream = input.output_schema()?;
                let field = expr.to_field(name, &upstream, &format!("derive '{name}'"))?;
                Ok(upstream.with_field(field))
            }
            LogicalPlan::Filter { input, .. } | LogicalPlan::Sink { input, .. } => {
                input.output_schema()
            }
            LogicalPlan::Project { input, columns } => {
                let upstream = input.output_schema()?;
                upstream.select(columns).ok_or_else(|| {
                    let missing = columns
                        .iter()
                        .find(|c| !upstream.contains(c))
                        .cloned()
                        .unwrap_or_default();
                    PlanError::UnknownReference {
                        column: missing,
                        context: "project".into(),
                    }
                })
            }
        }
    }
}

/// Scan with its pushdown annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanNode {
    pub source: String,
    pub schema: Arc<Schema>,
    /// Columns needed downstream of the scan, in schema order.
    pub required_columns: Vec<String>,
    /// Conjuncts evaluated inside the scan, in chain order.
    pub pushed_predicates: Vec<Expr>,
}

impl ScanNode {
    /// Columns the scan must materialize: required plus those the pushed
    /// predicates reference, in schema order.
    pub fn read_columns(&self) -> Vec<String> {
        let mut wanted: BTreeSet<String> = self.required_columns.iter().cloned().collect();
        for p in &self.pushed_predicates {
            p.collect_columns(&mut wanted);
        }
        self.schema
            .fields
            .iter()
            .filter(|f| wanted.contains(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn pushed_predicate(&self) -> Option<Expr> {
        Expr::conjunction(self.pushed_predicates.iter().cloned())
    }
}

/// A post-scan transform, executed in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Derive { name: String, expr: Expr },
    Filter { predicate: Expr },
    Project { columns: Vec<String> },
}

impl Stage {
    pub fn kind(&self) -> &'static str {
        match self {
            Stage::Derive { .. } => "derive",
            Stage::Filter { .. } => "filter",
            Stage::Project { .. } => "project",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkNode {
    pub destination: String,
    pub compression: Compression,
}

/// Executable form of a plan. Only the planner constructs these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPlan {
    pub scan: ScanNode,
    pub stages: Vec<Stage>,
    /// Final column layout; the engine reorders to it after the last stage.
    pub output_schema: Schema,
    pub sink: Option<SinkNode>,
    /// Derives removed because nothing downstream reads them.
    #[serde(default)]
    pub dropped_derives: Vec<String>,
}

impl OptimizedPlan {
    pub fn output_columns(&self) -> Vec<String> {
        self.output_schema.names()
    }
}
