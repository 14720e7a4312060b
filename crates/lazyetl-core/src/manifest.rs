//! Run manifest emitted after a successful pipeline run.
//!
//! Identical plans over identical inputs produce manifests that differ only
//! in `id` and the timestamps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

/// Row and batch counters for one run.
///
/// `rows_written == rows_read - rows_skipped - rows_filtered` holds for every
/// completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Data rows the scanner pulled from the sources.
    pub rows_read: u64,
    /// Rows dropped because a field failed typing.
    pub rows_skipped: u64,
    /// Rows removed by predicates, pushed or not.
    pub rows_filtered: u64,
    pub rows_written: u64,
    /// Non-empty batches that reached the sink.
    pub batches: u64,
    /// Source files visited.
    pub files: u64,
}

impl RunStats {
    pub fn is_balanced(&self) -> bool {
        self.rows_read
            .checked_sub(self.rows_skipped)
            .and_then(|v| v.checked_sub(self.rows_filtered))
            == Some(self.rows_written)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// Stable hash of the optimized plan that ran.
    pub plan_hash: Hash256,

    /// Stable hash of the output schema.
    pub output_schema_hash: Hash256,

    pub destination: Option<String>,

    pub stats: RunStats,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(plan_hash: Hash256, output_schema_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            engine_version: crate::VERSION.to_string(),
            plan_hash,
            output_schema_hash,
            destination: None,
            stats: RunStats::default(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, stats: RunStats, destination: Option<String>) -> Self {
        self.finished_ms = finished_ms;
        self.stats = stats;
        self.destination = destination;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}
