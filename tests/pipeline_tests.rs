//! End-to-end runs of the taxi presets: CSV in, Parquet out.

mod test_data_gen;

use std::fs;

use lazyetl_core::dag::Compression;
use lazyetl_core::expr::col;
use lazyetl_core::schema::DataType;
use lazyetl_core::types::{RowBatch, Scalar};
use lazyetl_exec::{ExecError, StageKind};
use lazyetl_io::readers::parquet::{inspect, read_rows};
use lazyetl_planner::presets::CURATED_COLUMNS;
use lazyetl_planner::{trip_schema, PlanBuilder, Preset};
use test_data_gen::{engine, generated_trips, two_row_scenario, DataDir, Trip, TRIP_HEADER};

const MINUTE_US: i64 = 60 * 1_000_000;

fn values(batches: &[RowBatch], column: &str) -> Vec<Scalar> {
    batches
        .iter()
        .flat_map(|b| b.column(column).map(|c| c.values.clone()).unwrap_or_default())
        .collect()
}

#[test]
fn two_row_scenario_filtered() {
    let data = DataDir::new();
    data.write_trips("trips.csv", &two_row_scenario());
    let plan = Preset::Filtered
        .build(data.path(), Compression::Snappy)
        .unwrap();

    let manifest = engine(1024).run(&plan).unwrap();
    assert_eq!(manifest.stats.rows_read, 2);
    assert_eq!(manifest.stats.rows_filtered, 1);
    assert_eq!(manifest.stats.rows_written, 1);

    let (schema, batches) = read_rows(data.join("filtered.parquet")).unwrap();
    assert_eq!(schema.len(), 21);
    assert_eq!(
        schema.field_by_name("trip_duration").unwrap().data_type,
        DataType::Duration
    );
    assert_eq!(schema.field_by_name("year").unwrap().data_type, DataType::Int32);
    assert_eq!(
        values(&batches, "trip_duration"),
        vec![Scalar::Duration(30 * MINUTE_US)]
    );
    assert_eq!(values(&batches, "year"), vec![Scalar::I32(2021)]);
    assert_eq!(values(&batches, "passenger_count"), vec![Scalar::I64(2)]);
}

#[test]
fn curated_writes_core_columns_only() {
    let data = DataDir::new();
    data.write_trips("trips.csv", &two_row_scenario());
    let plan = Preset::Curated.build(data.path(), Compression::Zstd).unwrap();
    engine(1024).run(&plan).unwrap();

    let out = data.join("nycyellotaxi.parquet");
    let (schema, batches) = read_rows(&out).unwrap();
    assert_eq!(schema.names(), CURATED_COLUMNS.to_vec());
    assert_eq!(batches.iter().map(RowBatch::num_rows).sum::<usize>(), 1);

    let summary = inspect(&out).unwrap();
    assert_eq!(summary.num_rows, 1);
    assert!(summary.compression.iter().all(|c| c.starts_with("ZSTD")));
}

#[test]
fn counters_balance_across_files_and_batches() {
    let data = DataDir::new();
    let trips = generated_trips(500);
    data.write_trips("part-1.csv", &trips[..250]);
    let mut rest = trips[250..].to_vec();
    rest[3].pickup = "03/01/2021 10:00".into();
    rest[40].passengers = "two".into();
    data.write_trips("part-2.csv", &rest);

    let expected = (0..500)
        .filter(|i| ![253, 290].contains(i))
        .filter(|i| i % 4 >= 2 && i % 3 != 0)
        .count() as u64;

    let plan = Preset::Filtered
        .build(data.path(), Compression::Snappy)
        .unwrap();
    let manifest = engine(7).run(&plan).unwrap();
    let stats = manifest.stats;
    assert_eq!(stats.files, 2);
    assert_eq!(stats.rows_read, 500);
    assert_eq!(stats.rows_skipped, 2);
    assert_eq!(stats.rows_written, expected);
    assert_eq!(
        stats.rows_written,
        stats.rows_read - stats.rows_filtered - stats.rows_skipped
    );
    assert_eq!(inspect(data.join("filtered.parquet")).unwrap().num_rows, expected);
}

#[test]
fn row_groups_follow_config() {
    let data = DataDir::new();
    data.write_trips("trips.csv", &generated_trips(240));
    let cfg = lazyetl_core::config::EngineConfig {
        batch_rows: 16,
        row_group_rows: 20,
        ..Default::default()
    };
    let plan = Preset::Filtered
        .build(data.path(), Compression::Snappy)
        .unwrap();
    let manifest = lazyetl_exec::Engine::new(cfg).unwrap().run(&plan).unwrap();

    let summary = inspect(data.join("filtered.parquet")).unwrap();
    assert_eq!(summary.num_rows, manifest.stats.rows_written);
    assert!(summary.row_groups > 1);
    assert!(summary.row_group_rows.iter().all(|n| *n <= 20));
}

#[test]
fn header_only_source_writes_empty_file_with_derived_schema() {
    let data = DataDir::new();
    data.write_raw("empty.csv", &format!("{TRIP_HEADER}\n"));
    let plan = Preset::Filtered
        .build(data.path(), Compression::Snappy)
        .unwrap();
    let manifest = engine(64).run(&plan).unwrap();
    assert_eq!(manifest.stats.rows_read, 0);
    assert_eq!(manifest.stats.batches, 0);

    let summary = inspect(data.join("filtered.parquet")).unwrap();
    assert_eq!(summary.num_rows, 0);
    let schema = summary.schema.unwrap();
    assert_eq!(schema.len(), 21);
    assert_eq!(schema.fields[19].name, "trip_duration");
    assert_eq!(schema.fields[20].name, "year");
}

#[test]
fn untyped_rows_are_skipped_and_counted() {
    let data = DataDir::new();
    let mut bad_time = Trip::new("2021-01-01 00:00:00", "2021-01-01 00:30:00", 3, 1.0);
    bad_time.dropoff = "not a time".into();
    let mut bad_count = Trip::new("2021-01-01 00:00:00", "2021-01-01 00:30:00", 3, 1.0);
    bad_count.passengers = "3 people".into();
    let mut null_count = Trip::new("2021-01-01 00:00:00", "2021-01-01 00:30:00", 3, 1.0);
    null_count.passengers = String::new();
    let good = Trip::new("2021-06-01 08:00:00", "2021-06-01 08:15:00", 4, 2.0);

    data.write_trips("trips.csv", &[bad_time, good, bad_count, null_count]);
    let plan = Preset::Filtered
        .build(data.path(), Compression::Snappy)
        .unwrap();
    let manifest = engine(2).run(&plan).unwrap();
    assert_eq!(manifest.stats.rows_read, 4);
    assert_eq!(manifest.stats.rows_skipped, 2);
    // A missing passenger count is NULL, which the filter rejects.
    assert_eq!(manifest.stats.rows_filtered, 1);
    assert_eq!(manifest.stats.rows_written, 1);

    let (_, batches) = read_rows(data.join("filtered.parquet")).unwrap();
    assert_eq!(
        values(&batches, "trip_duration"),
        vec![Scalar::Duration(15 * MINUTE_US)]
    );
}

#[test]
fn rerun_is_byte_identical() {
    let data = DataDir::new();
    data.write_trips("trips.csv", &generated_trips(300));
    let plan = Preset::Curated
        .build(data.path(), Compression::Snappy)
        .unwrap();
    let out = data.join("nycyellotaxi.parquet");

    let first = engine(50).run(&plan).unwrap();
    let bytes = fs::read(&out).unwrap();
    let second = engine(50).run(&plan).unwrap();
    assert_eq!(fs::read(&out).unwrap(), bytes);
    assert_eq!(first.plan_hash, second.plan_hash);
    assert_eq!(first.output_schema_hash, second.output_schema_hash);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn files_are_read_in_path_order() {
    let data = DataDir::new();
    let mut late = Trip::new("2021-01-02 00:00:00", "2021-01-02 00:05:00", 2, 1.0);
    late.vendor = "2".into();
    let early = Trip::new("2021-01-01 00:00:00", "2021-01-01 00:05:00", 2, 1.0);
    data.write_trips("b.csv", &[late]);
    data.write_trips("a.csv", &[early]);

    let plan = Preset::Filtered
        .build(data.path(), Compression::Snappy)
        .unwrap();
    engine(8).run(&plan).unwrap();
    let (_, batches) = read_rows(data.join("filtered.parquet")).unwrap();
    assert_eq!(
        values(&batches, "VendorID"),
        vec![Scalar::I64(1), Scalar::I64(2)]
    );
}

#[test]
fn empty_glob_fails_before_writing() {
    let data = DataDir::new();
    let plan = Preset::Curated
        .build(data.path(), Compression::Snappy)
        .unwrap();
    let err = engine(64).run(&plan).unwrap_err();
    assert_eq!(err.stage(), Some(StageKind::Scan));
    assert!(!data.join("nycyellotaxi.parquet").exists());
}

#[test]
fn failed_run_leaves_existing_output_untouched() {
    let data = DataDir::new();
    let ok = Trip::new("2021-01-01 00:00:00", "2021-01-01 00:30:00", 2, 1.0);
    let zero = Trip::new("2021-01-01 00:00:00", "2021-01-01 00:30:00", 0, 1.0);
    data.write_trips("trips.csv", &[ok.clone(), ok, zero]);

    let dest = data.join("out.parquet");
    fs::write(&dest, b"previous output").unwrap();
    let plan = PlanBuilder::scan(data.glob(), trip_schema())
        .unwrap()
        .derive_column("per_passenger", col("VendorID") / col("passenger_count"))
        .unwrap()
        .sink(dest.display().to_string(), Compression::Snappy)
        .unwrap();

    let err = engine(1).run(&plan).unwrap_err();
    match &err {
        ExecError::Stage {
            stage, location, ..
        } => {
            assert_eq!(*stage, StageKind::Transform);
            assert_eq!(location.row, Some(4));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(err.to_string().contains("trips.csv"));
    assert_eq!(fs::read(&dest).unwrap(), b"previous output");
    assert!(!data.join("out.parquet.inprogress").exists());
}
