use std::fmt::Write as _;
use std::fs;

use criterion::{criterion_group, criterion_main, Criterion};
use lazyetl_core::config::EngineConfig;
use lazyetl_core::dag::Compression;
use lazyetl_core::expr::{col, lit};
use lazyetl_core::schema::DataType;
use lazyetl_core::types::{Column, RowBatch, Scalar};
use lazyetl_exec::Engine;
use lazyetl_operators::eval::evaluate_mask;
use lazyetl_operators::{Derive, Operator};
use lazyetl_planner::Preset;

const TRIPS: usize = 20_000;

fn make_batch(rows: usize) -> RowBatch {
    let mut passengers = Vec::with_capacity(rows);
    let mut tips = Vec::with_capacity(rows);
    let mut pickups = Vec::with_capacity(rows);
    let mut dropoffs = Vec::with_capacity(rows);
    for i in 0..rows {
        passengers.push(Scalar::I64((i % 5) as i64));
        tips.push(Scalar::F64((i % 3) as f64 * 0.5));
        let start = 1_609_459_200_000_000 + i as i64 * 60_000_000;
        pickups.push(Scalar::Timestamp(start));
        dropoffs.push(Scalar::Timestamp(start + 900_000_000));
    }
    RowBatch::try_new(vec![
        Column::new("passenger_count", DataType::Int64, passengers),
        Column::new("tip_amount", DataType::Float64, tips),
        Column::new("pickup", DataType::Timestamp, pickups),
        Column::new("dropoff", DataType::Timestamp, dropoffs),
    ])
    .unwrap()
}

fn bench_predicate(c: &mut Criterion) {
    let batch = make_batch(8192);
    let predicate = col("passenger_count")
        .gt(lit(1i64))
        .and(col("tip_amount").gt(lit(0i64)));
    c.bench_function("filter_mask_8k", |b| {
        b.iter(|| evaluate_mask(&predicate, &batch).unwrap())
    });
}

fn bench_derive(c: &mut Criterion) {
    let batch = make_batch(8192);
    let duration = Derive::new("trip_duration", col("dropoff") - col("pickup"));
    c.bench_function("derive_duration_8k", |b| {
        b.iter(|| duration.eval_block(batch.clone()).unwrap())
    });
}

fn bench_curated_pipeline(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from(
        "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,\
pickup_longitude,pickup_latitude,RatecodeID,store_and_fwd_flag,dropoff_longitude,\
dropoff_latitude,payment_type,fare_amount,extra,mta_tax,tip_amount,tolls_amount,\
improvement_surcharge,total_amount\n",
    );
    for i in 0..TRIPS {
        let _ = writeln!(
            body,
            "1,2021-01-01 {h:02}:{m:02}:00,2021-01-01 {h:02}:{m:02}:45,{p},2.5,-73.99,40.73,1,N,\
-73.98,40.75,1,10.0,0.5,0.5,{t},0.0,0.3,14.3",
            h = (i / 60) % 24,
            m = i % 60,
            p = i % 4,
            t = i % 3
        );
    }
    fs::write(dir.path().join("trips.csv"), body).unwrap();
    let plan = Preset::Curated
        .build(dir.path(), Compression::Snappy)
        .unwrap();
    let engine = Engine::new(EngineConfig::default()).unwrap();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("curated_20k_rows", |b| {
        b.iter(|| engine.run(&plan).unwrap())
    });
    group.finish();
}

criterion_group!(operators, bench_predicate, bench_derive);
criterion_group!(pipeline, bench_curated_pipeline);
criterion_main!(operators, pipeline);
