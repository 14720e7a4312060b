//! Run counters and the tracing summary emitted at the end of a run.
//!
//! Library code only emits events; the binary decides where they go.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use lazyetl_core::manifest::RunStats;

/// Wall-clock accounting for one named phase of a run.
#[derive(Debug)]
pub struct StageTimer {
    name: &'static str,
    started: Instant,
    busy: Duration,
}

impl StageTimer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
            busy: Duration::ZERO,
        }
    }

    /// Run `f`, adding its duration to this timer's busy time.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let t0 = Instant::now();
        let out = f();
        self.add(t0.elapsed());
        out
    }

    pub fn add(&mut self, spent: Duration) {
        self.busy += spent;
    }

    pub fn busy(&self) -> Duration {
        self.busy
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Add one scan chunk's counters.
pub fn record_chunk(stats: &mut RunStats, rows_read: u64, rows_skipped: u64) {
    stats.rows_read += rows_read;
    stats.rows_skipped += rows_skipped;
}

/// Add the rows a filter removed.
pub fn record_filtered(stats: &mut RunStats, before: usize, after: usize) {
    stats.rows_filtered += before.saturating_sub(after) as u64;
}

/// Count one batch handed downstream.
pub fn record_batch(stats: &mut RunStats, rows: usize) {
    stats.batches += 1;
    stats.rows_written += rows as u64;
}

pub fn log_summary(stats: &RunStats, timers: &[&StageTimer]) {
    for t in timers {
        debug!(
            stage = t.name(),
            busy_ms = t.busy().as_millis() as u64,
            elapsed_ms = t.elapsed().as_millis() as u64,
            "stage timing"
        );
    }
    if !stats.is_balanced() {
        warn!(?stats, "row counters do not balance");
    }
    info!(
        files = stats.files,
        rows_read = stats.rows_read,
        rows_skipped = stats.rows_skipped,
        rows_filtered = stats.rows_filtered,
        rows_written = stats.rows_written,
        batches = stats.batches,
        "run complete"
    );
}
