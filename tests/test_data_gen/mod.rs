//! Shared fixtures: synthetic yellow-taxi CSV files in scratch directories.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use lazyetl_core::config::EngineConfig;
use lazyetl_exec::Engine;

/// Header of a yellow-taxi trip file, in the preset schema's order.
pub const TRIP_HEADER: &str = "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,\
passenger_count,trip_distance,pickup_longitude,pickup_latitude,RatecodeID,\
store_and_fwd_flag,dropoff_longitude,dropoff_latitude,payment_type,fare_amount,\
extra,mta_tax,tip_amount,tolls_amount,improvement_surcharge,total_amount";

/// One trip record. Fields are kept as text so tests can inject bad values.
#[derive(Debug, Clone)]
pub struct Trip {
    pub vendor: String,
    pub pickup: String,
    pub dropoff: String,
    pub passengers: String,
    pub tip: String,
}

impl Trip {
    pub fn new(pickup: &str, dropoff: &str, passengers: i64, tip: f64) -> Self {
        Self {
            vendor: "1".into(),
            pickup: pickup.into(),
            dropoff: dropoff.into(),
            passengers: passengers.to_string(),
            tip: format!("{tip}"),
        }
    }

    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},2.5,-73.99,40.73,1,N,-73.98,40.75,1,10.0,0.5,0.5,{},0.0,0.3,14.3",
            self.vendor, self.pickup, self.dropoff, self.passengers, self.tip
        )
    }
}

/// A scratch data directory that lives as long as the value.
pub struct DataDir {
    dir: tempfile::TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn glob(&self) -> String {
        self.join("*.csv").display().to_string()
    }

    /// Write `trips` under the standard header.
    pub fn write_trips(&self, name: &str, trips: &[Trip]) -> PathBuf {
        let mut body = String::from(TRIP_HEADER);
        body.push('\n');
        for t in trips {
            let _ = writeln!(body, "{}", t.to_csv());
        }
        self.write_raw(name, &body)
    }

    pub fn write_raw(&self, name: &str, body: &str) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, body).expect("write csv");
        path
    }
}

/// The two-trip sample: only the first passes the filter.
pub fn two_row_scenario() -> Vec<Trip> {
    vec![
        Trip::new("2021-01-01 00:00:00", "2021-01-01 00:30:00", 2, 1.5),
        Trip::new("2021-01-01 01:00:00", "2021-01-01 01:10:00", 1, 2.0),
    ]
}

/// `n` deterministic trips, a mix of passing and failing rows.
pub fn generated_trips(n: usize) -> Vec<Trip> {
    (0..n)
        .map(|i| {
            let minute = i % 60;
            let hour = (i / 60) % 24;
            let pickup = format!("2021-03-01 {hour:02}:{minute:02}:00");
            let dropoff = format!("2021-03-01 {hour:02}:{minute:02}:{:02}", 10 + i % 40);
            let passengers = (i % 4) as i64;
            let tip = if i % 3 == 0 { 0.0 } else { (i % 7) as f64 + 0.25 };
            Trip::new(&pickup, &dropoff, passengers, tip)
        })
        .collect()
}

pub fn engine(batch_rows: usize) -> Engine {
    Engine::new(EngineConfig {
        batch_rows,
        ..EngineConfig::default()
    })
    .expect("valid config")
}
