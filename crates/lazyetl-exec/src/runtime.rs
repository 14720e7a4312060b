//! Runtime: pull batches through an `OptimizedPlan` and stream them to the sink.
//!
//! Behavior:
//! - `Engine::execute` checks every stage's schema against the optimizer's
//!   output schema before any file is opened, then returns a lazy stream.
//! - Each pull reads one bounded scanner chunk, applies the pushed predicate,
//!   narrows to the required columns, runs the stages in chain order and
//!   reorders to the output layout. Batches left empty are not yielded.
//! - `Engine::run_optimized` writes the stream into a `ParquetSink` and emits
//!   a `RunManifest` with stable plan and schema hashes.

use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{info, warn};

use lazyetl_core::config::EngineConfig;
use lazyetl_core::dag::{LogicalPlan, OptimizedPlan, Stage};
use lazyetl_core::error::{Error as CoreError, PlanError, SchemaError};
use lazyetl_core::expr::Expr;
use lazyetl_core::hash::hash_serde;
use lazyetl_core::manifest::{RunManifest, RunStats};
use lazyetl_core::types::RowBatch;

use lazyetl_io::readers::csv::{CsvScanner, ScanChunk, ScanOptions};
use lazyetl_io::writers::parquet::{ParquetSink, SinkOptions};
use lazyetl_io::{IoError, SinkError};

use lazyetl_operators::eval::evaluate_mask;
use lazyetl_operators::{Derive, Filter, OpError, Operator, Project};

use crate::cancel::CancelToken;
use crate::metrics::{log_summary, record_batch, record_chunk, record_filtered, StageTimer};

/// Pipeline phase an execution error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Scan,
    Transform,
    Filter,
    Project,
    Sink,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Scan => "scan",
            StageKind::Transform => "transform",
            StageKind::Filter => "filter",
            StageKind::Project => "project",
            StageKind::Sink => "sink",
        }
    }

    fn of(stage: &Stage) -> Self {
        match stage {
            Stage::Derive { .. } => StageKind::Transform,
            Stage::Filter { .. } => StageKind::Filter,
            Stage::Project { .. } => StageKind::Project,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where in the input an error happened. `row` is the source line number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: Option<String>,
    pub row: Option<u64>,
}

impl Location {
    fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            row: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.row) {
            (Some(file), Some(row)) => write!(f, " at {file}, row {row}"),
            (Some(file), None) => write!(f, " in {file}"),
            (None, Some(row)) => write!(f, " at row {row}"),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{stage} stage failed{location}: {message}")]
    Stage {
        stage: StageKind,
        location: Location,
        message: String,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecError {
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            ExecError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            ExecError::Stage { location, .. } => Some(location),
            _ => None,
        }
    }
}

impl From<CoreError> for ExecError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config(msg) => ExecError::Config(msg),
            CoreError::Plan(p) => ExecError::Plan(p),
            other => ExecError::Internal(other.to_string()),
        }
    }
}

fn scan_error(e: IoError) -> ExecError {
    let location = match &e {
        IoError::Csv { file, line, .. } => Location {
            file: Some(file.clone()),
            row: *line,
        },
        IoError::Schema(SchemaError::UnknownColumn { file, .. }) => Location::file(file.clone()),
        _ => Location::default(),
    };
    ExecError::Stage {
        stage: StageKind::Scan,
        location,
        message: e.to_string(),
    }
}

fn sink_error(destination: &str, e: SinkError) -> ExecError {
    ExecError::Stage {
        stage: StageKind::Sink,
        location: Location::file(destination),
        message: e.to_string(),
    }
}

/// Map an operator failure; `lines` translates batch row indexes to source lines.
fn op_error(stage: StageKind, file: &str, lines: &[u64], e: OpError) -> ExecError {
    match e {
        OpError::Plan(p) => ExecError::Plan(p),
        OpError::Exec { row, message } => ExecError::Stage {
            stage,
            location: Location {
                file: Some(file.to_string()),
                row: row.and_then(|r| lines.get(r).copied()),
            },
            message,
        },
    }
}

fn batch_error(stage: StageKind, file: &str, e: CoreError) -> ExecError {
    ExecError::Stage {
        stage,
        location: Location::file(file),
        message: e.to_string(),
    }
}

/// Operator schema checks run before any I/O, so they can only be plan errors.
fn plan_time(e: OpError) -> ExecError {
    match e {
        OpError::Plan(p) => ExecError::Plan(p),
        OpError::Exec { message, .. } => ExecError::Internal(message),
    }
}

fn retain_lines(lines: Vec<u64>, mask: &[bool]) -> Vec<u64> {
    lines
        .into_iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(line, _)| line)
        .collect()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lazy, finite, non-restartable stream of output batches.
///
/// After the first error, or once the source is exhausted, `next` returns
/// `None`.
pub struct BatchStream {
    scanner: CsvScanner,
    pushed: Option<Expr>,
    required: Vec<String>,
    ops: Vec<(StageKind, Box<dyn Operator>)>,
    output_columns: Vec<String>,
    cancel: CancelToken,
    stats: RunStats,
    timer: StageTimer,
    done: bool,
}

impl BatchStream {
    /// Counters for everything pulled so far.
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn timer(&self) -> &StageTimer {
        &self.timer
    }

    fn process(&mut self, chunk: ScanChunk) -> Result<RowBatch, ExecError> {
        let ScanChunk {
            batch,
            file,
            mut lines,
            rows_read,
            rows_skipped,
        } = chunk;
        record_chunk(&mut self.stats, rows_read, rows_skipped);

        let mut batch = batch;
        if let Some(predicate) = &self.pushed {
            let mask = evaluate_mask(predicate, &batch)
                .map_err(|e| op_error(StageKind::Filter, &file, &lines, e))?;
            let before = batch.num_rows();
            batch = batch
                .filter(&mask)
                .map_err(|e| batch_error(StageKind::Filter, &file, e))?;
            lines = retain_lines(lines, &mask);
            record_filtered(&mut self.stats, before, batch.num_rows());
        }
        let mut batch = batch
            .select(&self.required)
            .map_err(|e| batch_error(StageKind::Scan, &file, e))?;

        for (kind, op) in &self.ops {
            let mask = op
                .row_mask(&batch)
                .map_err(|e| op_error(*kind, &file, &lines, e))?;
            match mask {
                Some(mask) => {
                    let before = batch.num_rows();
                    batch = batch
                        .filter(&mask)
                        .map_err(|e| batch_error(*kind, &file, e))?;
                    lines = retain_lines(lines, &mask);
                    record_filtered(&mut self.stats, before, batch.num_rows());
                }
                None => {
                    batch = op
                        .eval_block(batch)
                        .map_err(|e| op_error(*kind, &file, &lines, e))?;
                }
            }
        }

        batch
            .select(&self.output_columns)
            .map_err(|e| batch_error(StageKind::Project, &file, e))
    }
}

impl Iterator for BatchStream {
    type Item = Result<RowBatch, ExecError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.cancel.is_cancelled() {
                self.done = true;
                warn!("cancellation observed; stopping stream");
                return Some(Err(ExecError::Cancelled));
            }
            let t0 = Instant::now();
            let pulled = self.scanner.next_chunk();
            self.stats.files = self.scanner.stats().files;
            let chunk = match pulled {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(scan_error(e)));
                }
            };
            let out = self.process(chunk);
            self.timer.add(t0.elapsed());
            match out {
                Ok(batch) if batch.is_empty() => continue,
                Ok(batch) => {
                    record_batch(&mut self.stats, batch.num_rows());
                    return Some(Ok(batch));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Engine owns the validated configuration and the cancellation token.
pub struct Engine {
    cfg: EngineConfig,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Result<Self, ExecError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            cancel: CancelToken::new(),
        })
    }

    /// Share `token` with the caller so it can stop a run between batches.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Prepare a stream over `plan`. Nothing is read until the first `next`.
    pub fn execute(&self, plan: &OptimizedPlan) -> Result<BatchStream, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        let scan = &plan.scan;
        let read_columns = scan.read_columns();
        let read_schema = scan.schema.select(&read_columns).ok_or_else(|| {
            PlanError::InvalidPlan(format!("scan of {} reads undeclared columns", scan.source))
        })?;

        let pushed = scan.pushed_predicate();
        if let Some(predicate) = &pushed {
            Filter::new(predicate.clone())
                .plan(&read_schema)
                .map_err(plan_time)?;
        }

        let mut schema = read_schema.select(&scan.required_columns).ok_or_else(|| {
            PlanError::InvalidPlan("required columns are not all read by the scan".into())
        })?;
        let mut ops: Vec<(StageKind, Box<dyn Operator>)> = Vec::with_capacity(plan.stages.len());
        for stage in &plan.stages {
            let op: Box<dyn Operator> = match stage {
                Stage::Derive { name, expr } => Box::new(Derive::new(name.clone(), expr.clone())),
                Stage::Filter { predicate } => Box::new(Filter::new(predicate.clone())),
                Stage::Project { columns } => Box::new(Project::new(columns.clone())),
            };
            schema = op.plan(&schema).map_err(plan_time)?;
            ops.push((StageKind::of(stage), op));
        }
        for field in &plan.output_schema.fields {
            match schema.field_by_name(&field.name) {
                Some(f) if f.data_type == field.data_type => {}
                Some(f) => {
                    return Err(PlanError::InvalidPlan(format!(
                        "output column '{}' is {} but the stages produce {}",
                        field.name, field.data_type, f.data_type
                    ))
                    .into())
                }
                None => {
                    return Err(PlanError::InvalidPlan(format!(
                        "output column '{}' is not produced by any stage",
                        field.name
                    ))
                    .into())
                }
            }
        }

        let opts = ScanOptions::from_config(&self.cfg)?;
        let scanner = CsvScanner::open(&scan.source, scan.schema.clone(), &read_columns, opts)
            .map_err(scan_error)?;
        info!(
            source = %scan.source,
            read = read_columns.len(),
            pushed = scan.pushed_predicates.len(),
            stages = ops.len(),
            "execution started"
        );
        Ok(BatchStream {
            scanner,
            pushed,
            required: scan.required_columns.clone(),
            ops,
            output_columns: plan.output_columns(),
            cancel: self.cancel.clone(),
            stats: RunStats::default(),
            timer: StageTimer::start("execute"),
            done: false,
        })
    }

    /// Optimize and run `plan`, which must end in a sink.
    pub fn run(&self, plan: &LogicalPlan) -> Result<RunManifest, ExecError> {
        let optimized = lazyetl_planner::optimize(plan)?;
        self.run_optimized(&optimized)
    }

    /// Stream `plan` into its sink and return the run manifest.
    ///
    /// On any failure the sink's in-progress file is discarded and an
    /// existing destination is left as it was.
    pub fn run_optimized(&self, plan: &OptimizedPlan) -> Result<RunManifest, ExecError> {
        let sink_node = plan
            .sink
            .as_ref()
            .ok_or_else(|| PlanError::InvalidPlan("plan has no sink".into()))?;
        let destination = sink_node.destination.as_str();
        let started_ms = now_millis();
        let plan_hash = hash_serde(plan)?;
        let schema_hash = hash_serde(&plan.output_schema)?;

        let mut stream = self.execute(plan)?;
        let opts = SinkOptions {
            compression: sink_node.compression,
            row_group_rows: self.cfg.row_group_rows,
        };
        let mut sink = ParquetSink::create(destination, &plan.output_schema, opts)
            .map_err(|e| sink_error(destination, e))?;

        let mut sink_timer = StageTimer::start("sink");
        for batch in stream.by_ref() {
            let batch = batch?;
            sink_timer
                .measure(|| sink.write_batch(&batch))
                .map_err(|e| sink_error(destination, e))?;
        }
        let stats = stream.stats();
        // Checked before `finish` so a mismatch never replaces the destination.
        check_row_counts(sink.rows_written(), &stats)?;
        sink_timer
            .measure(|| sink.finish())
            .map_err(|e| sink_error(destination, e))?;

        log_summary(&stats, &[stream.timer(), &sink_timer]);
        Ok(RunManifest::new(plan_hash, schema_hash, started_ms).finish(
            now_millis(),
            stats,
            Some(destination.to_string()),
        ))
    }
}

fn check_row_counts(sink_rows: u64, stats: &RunStats) -> Result<(), ExecError> {
    if sink_rows != stats.rows_written {
        return Err(ExecError::Internal(format!(
            "sink buffered {sink_rows} rows, stream yielded {}",
            stats.rows_written
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use lazyetl_core::dag::Compression;
    use lazyetl_core::expr::{col, lit};
    use lazyetl_core::schema::{DataType, Field, Schema};
    use lazyetl_core::types::Scalar;
    use lazyetl_planner::{lower, optimize, PlanBuilder};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::try_new(vec![
                Field::new("id", DataType::Int64, true),
                Field::new("start", DataType::Timestamp, true),
                Field::new("end", DataType::Timestamp, true),
                Field::new("n", DataType::Int64, true),
                Field::new("tip", DataType::Float64, true),
                Field::new("d", DataType::Int64, true),
            ])
            .unwrap(),
        )
    }

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), format!("id,start,end,n,tip,d\n{body}")).unwrap();
    }

    fn engine(batch_rows: usize) -> Engine {
        Engine::new(EngineConfig {
            batch_rows,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn base(dir: &Path) -> PlanBuilder {
        PlanBuilder::scan(dir.join("*.csv").display().to_string(), schema()).unwrap()
    }

    fn collect(engine: &Engine, plan: &OptimizedPlan) -> (Vec<Vec<Scalar>>, RunStats) {
        let mut stream = engine.execute(plan).unwrap();
        let mut rows = Vec::new();
        for batch in stream.by_ref() {
            let batch = batch.unwrap();
            assert_eq!(batch.column_names(), plan.output_columns());
            rows.extend((0..batch.num_rows()).filter_map(|i| batch.row(i)));
        }
        (rows, stream.stats())
    }

    const ROWS: &str = "\
1,2021-01-01 00:00:00,2021-01-01 00:30:00,2,1.5,1
2,2021-01-01 01:00:00,2021-01-01 01:10:00,1,2.0,1
3,not-a-time,2021-01-01 02:00:00,3,1.0,1
4,2021-01-01 03:00:00,2021-01-01 03:05:00,4,0.0,1
5,2021-01-01 04:00:00,2021-01-01 04:20:00,3,0.5,1
";

    #[test]
    fn optimized_matches_naive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", ROWS);
        let plan = base(dir.path())
            .filter(col("n").gt(lit(1i64)).and(col("tip").gt(lit(0i64))))
            .unwrap()
            .derive_column("dur", col("end") - col("start"))
            .unwrap()
            .derive_column("unused", col("id") + col("n"))
            .unwrap()
            .project(["id", "dur"])
            .unwrap()
            .build();

        let eng = engine(2);
        let (fast, fast_stats) = collect(&eng, &optimize(&plan).unwrap());
        let (slow, slow_stats) = collect(&eng, &lower(&plan).unwrap());
        assert_eq!(fast, slow);
        assert_eq!(
            fast,
            vec![
                vec![Scalar::I64(1), Scalar::Duration(30 * 60 * 1_000_000)],
                vec![Scalar::I64(5), Scalar::Duration(20 * 60 * 1_000_000)],
            ]
        );
        assert_eq!(fast_stats.rows_read, 5);
        assert_eq!(fast_stats.rows_skipped, 1);
        assert_eq!(fast_stats.rows_filtered, 2);
        assert!(fast_stats.is_balanced());
        assert_eq!(fast_stats.rows_filtered, slow_stats.rows_filtered);
        assert_eq!(fast_stats.rows_written, slow_stats.rows_written);
    }

    #[test]
    fn empty_batches_are_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", ROWS);
        let plan = base(dir.path())
            .filter(col("id").gt(lit(4i64)))
            .unwrap()
            .build();
        let mut stream = engine(1).execute(&optimize(&plan).unwrap()).unwrap();
        let batches: Vec<_> = stream.by_ref().map(Result::unwrap).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
        assert_eq!(stream.stats().batches, 1);
        assert!(stream.next().is_none());
    }

    #[test]
    fn runtime_error_names_stage_file_and_row() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.csv",
            "1,2021-01-01 00:00:00,2021-01-01 00:30:00,2,1.5,1\n\
             2,2021-01-01 00:00:00,2021-01-01 00:30:00,2,1.5,0\n",
        );
        let plan = base(dir.path())
            .derive_column("q", col("n") / col("d"))
            .unwrap()
            .build();

        let err = engine(16)
            .execute(&optimize(&plan).unwrap())
            .unwrap()
            .find_map(Result::err);
        match err {
            Some(ExecError::Stage {
                stage,
                location,
                ..
            }) => {
                assert_eq!(stage, StageKind::Transform);
                assert_eq!(location.row, Some(3));
                assert!(location.file.unwrap().ends_with("a.csv"));
            }
            other => panic!("expected a transform-stage error, got {other:?}"),
        }
    }

    #[test]
    fn empty_glob_is_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let plan = base(dir.path()).build();
        let err = engine(16).execute(&optimize(&plan).unwrap()).err().unwrap();
        assert_eq!(err.stage(), Some(StageKind::Scan));
    }

    #[test]
    fn cancellation_stops_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", ROWS);
        let token = CancelToken::new();
        let eng = engine(1).with_cancel(token.clone());
        let mut stream = eng.execute(&optimize(&base(dir.path()).build()).unwrap()).unwrap();
        assert!(stream.next().unwrap().is_ok());
        token.cancel();
        assert!(matches!(stream.next(), Some(Err(ExecError::Cancelled))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn run_writes_sink_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", ROWS);
        let dest = dir.path().join("out/result.parquet");
        let plan = base(dir.path())
            .filter(col("n").gt(lit(1i64)))
            .unwrap()
            .derive_column("dur", col("end") - col("start"))
            .unwrap()
            .sink(dest.display().to_string(), Compression::Zstd)
            .unwrap();
        let manifest = engine(2).run(&plan).unwrap();
        assert!(dest.exists());
        assert_eq!(manifest.stats.rows_written, 3);
        assert!(manifest.stats.is_balanced());
        assert_eq!(manifest.destination.as_deref(), Some(dest.to_str().unwrap()));

        let again = engine(2).run(&plan).unwrap();
        assert_eq!(again.plan_hash, manifest.plan_hash);
        assert_eq!(again.output_schema_hash, manifest.output_schema_hash);
        assert_ne!(again.id, manifest.id);
    }

    #[test]
    fn run_without_sink_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", ROWS);
        let plan = base(dir.path()).build();
        assert!(matches!(
            engine(2).run(&plan),
            Err(ExecError::Plan(PlanError::InvalidPlan(_)))
        ));
    }

    #[test]
    fn row_count_mismatch_is_caught_before_publish() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.parquet");
        fs::write(&dest, b"old").unwrap();

        let schema = Schema::try_new(vec![Field::new("id", DataType::Int64, true)]).unwrap();
        let mut sink = ParquetSink::create(&dest, &schema, SinkOptions::default()).unwrap();
        let batch = RowBatch::try_new(vec![lazyetl_core::types::Column::new(
            "id",
            DataType::Int64,
            vec![Scalar::I64(1), Scalar::I64(2)],
        )])
        .unwrap();
        sink.write_batch(&batch).unwrap();

        let stats = RunStats {
            rows_written: 3,
            ..RunStats::default()
        };
        let err = check_row_counts(sink.rows_written(), &stats).unwrap_err();
        assert!(matches!(err, ExecError::Internal(_)));
        drop(sink);
        assert_eq!(fs::read(&dest).unwrap(), b"old");

        let stats = RunStats {
            rows_written: 2,
            ..RunStats::default()
        };
        assert!(check_row_counts(2, &stats).is_ok());
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = EngineConfig {
            batch_rows: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(cfg), Err(ExecError::Config(_))));
    }
}
