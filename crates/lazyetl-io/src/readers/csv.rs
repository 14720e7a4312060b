//! Typed CSV scanner over a glob of source files.
//!
//! Files are visited in lexicographic path order and a chunk never spans two
//! files. Every declared field of every row is typed, regardless of which
//! columns the chunk keeps, so the set of skipped rows does not depend on
//! projection.

use std::collections::VecDeque;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use lazyetl_core::config::EngineConfig;
use lazyetl_core::error::SchemaError;
use lazyetl_core::schema::{HeaderBinding, Schema};
use lazyetl_core::types::{Column, RowBatch, Scalar};

use crate::error::{IoError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Each chunk covers at most this many source records.
    pub batch_rows: usize,
    pub delimiter: u8,
    pub has_header: bool,
    pub timestamp_format: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default()).unwrap_or(Self {
            batch_rows: 65_536,
            delimiter: b',',
            has_header: true,
            timestamp_format: lazyetl_core::schema::DEFAULT_TIMESTAMP_FORMAT.to_string(),
        })
    }
}

impl ScanOptions {
    pub fn from_config(cfg: &EngineConfig) -> std::result::Result<Self, lazyetl_core::error::Error> {
        Ok(Self {
            batch_rows: cfg.batch_rows.max(1),
            delimiter: cfg.delimiter_byte()?,
            has_header: cfg.has_header,
            timestamp_format: cfg.timestamp_format.clone(),
        })
    }
}

/// Running totals across all files scanned so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: u64,
    pub rows_read: u64,
    pub rows_skipped: u64,
}

/// One bounded slice of one source file.
#[derive(Debug, Clone)]
pub struct ScanChunk {
    /// Surviving rows, restricted to the scanner's read columns.
    pub batch: RowBatch,
    pub file: Arc<str>,
    /// Source line of each surviving row.
    pub lines: Vec<u64>,
    pub rows_read: u64,
    pub rows_skipped: u64,
}

/// Expand `pattern` into the regular files it matches, sorted.
///
/// A pattern that matches nothing is an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| IoError::Source(format!("invalid glob '{pattern}': {e}")))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| IoError::Io(e.into_error()))?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        return Err(IoError::Source(format!("no files match '{pattern}'")));
    }
    Ok(paths)
}

struct OpenFile {
    name: Arc<str>,
    reader: csv::Reader<File>,
    binding: HeaderBinding,
    rows_read: u64,
    rows_skipped: u64,
}

pub struct CsvScanner {
    schema: Arc<Schema>,
    /// Schema field indexes kept in output chunks, in schema order.
    keep: Vec<usize>,
    opts: ScanOptions,
    pending: VecDeque<PathBuf>,
    current: Option<OpenFile>,
    record: StringRecord,
    stats: ScanStats,
}

impl CsvScanner {
    /// Resolve `source` and prepare to read `read_columns` of `schema`.
    ///
    /// No file is opened until the first `next_chunk`.
    pub fn open(
        source: &str,
        schema: Arc<Schema>,
        read_columns: &[String],
        opts: ScanOptions,
    ) -> Result<Self> {
        let files = expand_glob(source)?;
        let mut keep = Vec::with_capacity(read_columns.len());
        for name in read_columns {
            let idx = schema.index_of(name).ok_or_else(|| {
                IoError::Schema(SchemaError::UnknownColumn {
                    column: name.clone(),
                    file: source.to_string(),
                })
            })?;
            keep.push(idx);
        }
        keep.sort_unstable();
        keep.dedup();
        info!(source, files = files.len(), columns = keep.len(), "scan resolved");
        Ok(Self {
            schema,
            keep,
            opts,
            pending: files.into(),
            current: None,
            record: StringRecord::new(),
            stats: ScanStats::default(),
        })
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(false);
        };
        let name: Arc<str> = Arc::from(path.display().to_string());
        let mut reader = ReaderBuilder::new()
            .delimiter(self.opts.delimiter)
            .has_headers(self.opts.has_header)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| IoError::Source(format!("cannot open {name}: {e}")))?;
        let binding = if self.opts.has_header {
            let header = reader.headers().map_err(|e| IoError::Csv {
                file: name.to_string(),
                line: Some(1),
                message: e.to_string(),
            })?;
            self.schema.validate_header(&header.iter().collect::<Vec<_>>(), &name)?
        } else {
            HeaderBinding {
                positions: (0..self.schema.len()).collect(),
                header_len: self.schema.len(),
            }
        };
        info!(file = %name, "opened source file");
        self.stats.files += 1;
        self.current = Some(OpenFile {
            name,
            reader,
            binding,
            rows_read: 0,
            rows_skipped: 0,
        });
        Ok(true)
    }

    /// Read the next chunk, or `None` once every file is exhausted.
    ///
    /// A chunk may hold zero rows when every record in it failed typing.
    pub fn next_chunk(&mut self) -> Result<Option<ScanChunk>> {
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(None);
            }
            if let Some(chunk) = self.read_from_current()? {
                return Ok(Some(chunk));
            }
        }
    }

    /// `None` when the current file was already at EOF.
    fn read_from_current(&mut self) -> Result<Option<ScanChunk>> {
        let Some(file) = self.current.as_mut() else {
            return Ok(None);
        };
        let mut values: Vec<Vec<Scalar>> = self
            .keep
            .iter()
            .map(|_| Vec::with_capacity(self.opts.batch_rows.min(8192)))
            .collect();
        let mut lines = Vec::new();
        let mut read = 0u64;
        let mut skipped = 0u64;
        let mut eof = false;
        let mut row: Vec<Scalar> = Vec::with_capacity(self.schema.len());

        while read < self.opts.batch_rows as u64 {
            match file.reader.read_record(&mut self.record) {
                Ok(false) => {
                    eof = true;
                    break;
                }
                Ok(true) => {}
                Err(e) => {
                    let line = e.position().map(|p| p.line());
                    if matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) {
                        read += 1;
                        skipped += 1;
                        debug!(file = %file.name, ?line, error = %e, "skipping undecodable row");
                        continue;
                    }
                    return Err(IoError::Csv {
                        file: file.name.to_string(),
                        line,
                        message: e.to_string(),
                    });
                }
            }
            read += 1;
            let line = self.record.position().map(|p| p.line()).unwrap_or(0);

            row.clear();
            let mut failure = None;
            for (idx, field) in self.schema.fields.iter().enumerate() {
                let raw = file
                    .binding
                    .position(idx)
                    .and_then(|pos| self.record.get(pos));
                let typed = match raw {
                    Some(raw) => field.parse(raw, &self.opts.timestamp_format),
                    None => Err(SchemaError::MissingField {
                        column: field.name.clone(),
                    }),
                };
                match typed {
                    Ok(v) => row.push(v),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                if !e.is_row_level() {
                    return Err(e.into());
                }
                skipped += 1;
                debug!(file = %file.name, line, error = %e, "skipping row");
                continue;
            }
            for (slot, idx) in values.iter_mut().zip(&self.keep) {
                slot.push(std::mem::replace(&mut row[*idx], Scalar::Null));
            }
            lines.push(line);
        }

        file.rows_read += read;
        file.rows_skipped += skipped;
        self.stats.rows_read += read;
        self.stats.rows_skipped += skipped;
        let name = file.name.clone();

        if eof {
            if file.rows_skipped > 0 {
                warn!(file = %name, skipped = file.rows_skipped, "rows failed typing");
            }
            info!(file = %name, rows = file.rows_read, "finished source file");
            self.current = None;
        }
        if read == 0 {
            return Ok(None);
        }

        let columns = self
            .keep
            .iter()
            .zip(values)
            .filter_map(|(idx, vals)| {
                self.schema
                    .field(*idx)
                    .map(|f| Column::new(f.name.clone(), f.data_type, vals))
            })
            .collect();
        let batch = RowBatch::try_with_row_count(columns, lines.len())
            .map_err(|e| IoError::Source(e.to_string()))?;
        Ok(Some(ScanChunk {
            batch,
            file: name,
            lines,
            rows_read: read,
            rows_skipped: skipped,
        }))
    }
}

impl Iterator for CsvScanner {
    type Item = Result<ScanChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
