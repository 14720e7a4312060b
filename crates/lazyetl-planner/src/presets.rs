//! The NYC yellow-taxi pipelines.
//!
//! Both read every `*.csv` in the data directory, keep multi-passenger trips
//! that tipped, and derive `trip_duration` and `year`. `Filtered` writes all
//! columns; `Curated` writes the 17 core trip columns, so its derived columns
//! are optimized away.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use lazyetl_core::dag::{Compression, LogicalPlan};
use lazyetl_core::error::PlanError;
use lazyetl_core::expr::{col, lit};
use lazyetl_core::schema::{DataType, Field, Schema};

use crate::builder::PlanBuilder;

pub const PICKUP: &str = "tpep_pickup_datetime";
pub const DROPOFF: &str = "tpep_dropoff_datetime";

const TRIP_COLUMNS: [(&str, DataType); 19] = [
    ("VendorID", DataType::Int64),
    (PICKUP, DataType::Timestamp),
    (DROPOFF, DataType::Timestamp),
    ("passenger_count", DataType::Int64),
    ("trip_distance", DataType::Float64),
    ("pickup_longitude", DataType::Float64),
    ("pickup_latitude", DataType::Float64),
    ("RatecodeID", DataType::Int64),
    ("store_and_fwd_flag", DataType::Utf8),
    ("dropoff_longitude", DataType::Float64),
    ("dropoff_latitude", DataType::Float64),
    ("payment_type", DataType::Int64),
    ("fare_amount", DataType::Float64),
    ("extra", DataType::Float64),
    ("mta_tax", DataType::Float64),
    ("tip_amount", DataType::Float64),
    ("tolls_amount", DataType::Float64),
    ("improvement_surcharge", DataType::Float64),
    ("total_amount", DataType::Float64),
];

/// Columns written by `Preset::Curated`, in output order.
pub const CURATED_COLUMNS: [&str; 17] = [
    "VendorID",
    PICKUP,
    DROPOFF,
    "passenger_count",
    "trip_distance",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
    "payment_type",
    "fare_amount",
    "extra",
    "mta_tax",
    "tip_amount",
    "tolls_amount",
    "improvement_surcharge",
    "total_amount",
];

/// Yellow-taxi trip record layout. Every column is nullable.
pub fn trip_schema() -> Arc<Schema> {
    Arc::new(Schema {
        fields: TRIP_COLUMNS
            .iter()
            .map(|(name, ty)| Field::new(*name, *ty, true))
            .collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Filtered,
    Curated,
}

impl Preset {
    pub fn name(self) -> &'static str {
        match self {
            Preset::Filtered => "filtered",
            Preset::Curated => "curated",
        }
    }

    pub fn output_file(self) -> &'static str {
        match self {
            Preset::Filtered => "filtered.parquet",
            Preset::Curated => "nycyellotaxi.parquet",
        }
    }

    pub fn build(
        self,
        data_dir: impl AsRef<Path>,
        compression: Compression,
    ) -> Result<LogicalPlan, PlanError> {
        let dir = data_dir.as_ref();
        let source = dir.join("*.csv").display().to_string();
        let destination = dir.join(self.output_file()).display().to_string();

        let builder = PlanBuilder::scan(source, trip_schema())?
            .filter(
                col("passenger_count")
                    .gt(lit(1i64))
                    .and(col("tip_amount").gt(lit(0i64))),
            )?
            .derive_column("trip_duration", col(DROPOFF) - col(PICKUP))?
            .derive_column("year", col(PICKUP).year())?;
        let builder = match self {
            Preset::Filtered => builder,
            Preset::Curated => builder.project(CURATED_COLUMNS)?,
        };
        builder.sink(destination, compression)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filtered" => Ok(Preset::Filtered),
            "curated" => Ok(Preset::Curated),
            other => Err(format!("unknown preset '{other}' (expected filtered or curated)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::validate;
    use crate::rules::optimize;

    #[test]
    fn schema_has_unique_columns() {
        let s = trip_schema();
        assert_eq!(s.len(), 19);
        Schema::try_new(s.fields.clone()).unwrap();
    }

    #[test]
    fn filtered_keeps_derived_columns() {
        let plan = Preset::Filtered.build("d", Compression::Snappy).unwrap();
        let out = validate(&plan).unwrap();
        assert_eq!(out.len(), 21);
        assert_eq!(out.fields[19].name, "trip_duration");
        assert_eq!(out.fields[20].data_type, DataType::Int32);
        assert_eq!(plan.sink().unwrap().0, "d/filtered.parquet");
    }

    #[test]
    fn curated_drops_derives_and_two_columns() {
        let plan = Preset::Curated.build("d", Compression::Snappy).unwrap();
        let opt = optimize(&plan).unwrap();
        assert_eq!(opt.output_columns(), CURATED_COLUMNS.to_vec());
        assert_eq!(opt.dropped_derives, vec!["trip_duration", "year"]);
        assert!(!opt.scan.read_columns().contains(&"RatecodeID".to_string()));
        assert!(!opt.scan.read_columns().contains(&"store_and_fwd_flag".to_string()));
        assert_eq!(opt.scan.pushed_predicates.len(), 2);
    }

    #[test]
    fn preset_names_parse() {
        assert_eq!("curated".parse::<Preset>().unwrap(), Preset::Curated);
        assert!("other".parse::<Preset>().is_err());
    }
}
