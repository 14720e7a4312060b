//! YAML → LogicalPlan parser for linear pipelines.
//!
//! Example:
//! ```yaml
//! config:
//!   batch_rows: 32768
//! steps:
//!   - scan:
//!       source: "data/nycyellotaxi/*.csv"
//!       schema: yellow_taxi
//!   - filter:
//!       predicate:
//!         compare: { op: gt, left: { column: passenger_count }, right: { literal: { i64: 1 } } }
//!   - derive:
//!       name: trip_duration
//!       expr:
//!         arith:
//!           op: sub
//!           left: { column: tpep_dropoff_datetime }
//!           right: { column: tpep_pickup_datetime }
//!   - project: { columns: [passenger_count, trip_duration] }
//!   - sink: { destination: "out/trips.parquet", compression: zstd }
//! ```
//!
//! Expressions use the serde form of `lazyetl_core::expr::Expr`. An explicit
//! schema is a list of `{ name, type, nullable }` entries; `nullable`
//! defaults to true.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lazyetl_core::config::ConfigOverrides;
use lazyetl_core::dag::{Compression, LogicalPlan};
use lazyetl_core::error::PlanError;
use lazyetl_core::expr::Expr;
use lazyetl_core::schema::{DataType, Field, Schema};

use crate::builder::PlanBuilder;
use crate::presets::trip_schema;

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("invalid pipeline: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    #[serde(default)]
    pub config: Option<ConfigOverrides>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Scan { source: String, schema: SchemaDef },
    Derive { name: String, expr: Expr },
    Filter { predicate: Expr },
    Project { columns: Vec<String> },
    Sink {
        destination: String,
        #[serde(default)]
        compression: Compression,
    },
}

impl Step {
    fn kind(&self) -> &'static str {
        match self {
            Step::Scan { .. } => "scan",
            Step::Derive { .. } => "derive",
            Step::Filter { .. } => "filter",
            Step::Project { .. } => "project",
            Step::Sink { .. } => "sink",
        }
    }
}

/// Either a built-in schema name or an explicit field list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaDef {
    Named(String),
    Fields(Vec<FieldDef>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

fn parse_dtype(s: &str) -> Result<DataType, DslError> {
    Ok(match s {
        "Int64" | "i64" | "int64" => DataType::Int64,
        "Float64" | "f64" | "float64" => DataType::Float64,
        "Utf8" | "String" | "string" | "str" => DataType::Utf8,
        "Timestamp" | "Datetime" | "timestamp" | "datetime" => DataType::Timestamp,
        other => return Err(DslError::Invalid(format!("unknown column type '{other}'"))),
    })
}

fn to_schema(def: &SchemaDef) -> Result<Schema, DslError> {
    match def {
        SchemaDef::Named(name) if name == "yellow_taxi" => Ok(trip_schema().as_ref().clone()),
        SchemaDef::Named(other) => Err(DslError::Invalid(format!("unknown schema '{other}'"))),
        SchemaDef::Fields(fields) => {
            let fields = fields
                .iter()
                .map(|f| Ok(Field::new(f.name.clone(), parse_dtype(&f.data_type)?, f.nullable)))
                .collect::<Result<Vec<_>, DslError>>()?;
            Ok(Schema::try_new(fields).map_err(PlanError::from)?)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedPipeline {
    pub plan: LogicalPlan,
    pub config: ConfigOverrides,
}

/// Parse a YAML pipeline. Every step is type-checked as it is added.
pub fn parse_yaml_pipeline(yaml_src: &str) -> Result<ParsedPipeline, DslError> {
    let doc: Pipeline = serde_yaml::from_str(yaml_src)?;
    let mut steps = doc.steps.into_iter();

    let builder = match steps.next() {
        Some(Step::Scan { source, schema }) => {
            PlanBuilder::scan(source, std::sync::Arc::new(to_schema(&schema)?))?
        }
        Some(other) => {
            return Err(DslError::Invalid(format!(
                "first step must be 'scan', got '{}'",
                other.kind()
            )))
        }
        None => return Err(DslError::Invalid("empty pipeline".into())),
    };

    let mut cur = builder;
    let mut plan = None;
    for step in steps {
        if plan.is_some() {
            return Err(DslError::Invalid(format!(
                "'{}' after 'sink'; sink must be the last step",
                step.kind()
            )));
        }
        match step {
            Step::Scan { .. } => {
                return Err(DslError::Invalid("multiple scans not supported".into()))
            }
            Step::Derive { name, expr } => cur = cur.derive_column(name, expr)?,
            Step::Filter { predicate } => cur = cur.filter(predicate)?,
            Step::Project { columns } => cur = cur.project(columns)?,
            Step::Sink {
                destination,
                compression,
            } => {
                plan = Some(cur.clone().sink(destination, compression)?);
            }
        }
    }

    Ok(ParsedPipeline {
        plan: plan.unwrap_or_else(|| cur.build()),
        config: doc.config.unwrap_or_default(),
    })
}
