//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schema::DEFAULT_TIMESTAMP_FORMAT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on rows per batch pulled from the scanner.
    pub batch_rows: usize,

    /// Rows buffered per Parquet row group before it is flushed.
    pub row_group_rows: usize,

    /// Field delimiter of the source files. Must be a single ASCII character.
    pub delimiter: char,

    /// Whether the first record of each file is a header row.
    pub has_header: bool,

    /// chrono format for `Timestamp` source columns.
    pub timestamp_format: String,

    /// Directory the presets read `*.csv` from and write their output into.
    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_rows: 65_536,
            row_group_rows: 1_048_576,
            delimiter: ',',
            has_header: true,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            data_dir: "data/nycyellotaxi".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `LAZYETL_BATCH_ROWS`: rows per batch
    /// - `LAZYETL_ROW_GROUP_ROWS`: rows per Parquet row group
    /// - `LAZYETL_DELIMITER`: source field delimiter
    /// - `LAZYETL_TIMESTAMP_FORMAT`: chrono format for timestamp columns
    /// - `LAZYETL_DATA_DIR`: preset data directory
    ///
    /// Unparseable values are ignored; `validate` catches out-of-range ones.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("LAZYETL_BATCH_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.batch_rows = v;
            }
        }

        if let Ok(s) = std::env::var("LAZYETL_ROW_GROUP_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.row_group_rows = v;
            }
        }

        if let Ok(s) = std::env::var("LAZYETL_DELIMITER") {
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                cfg.delimiter = c;
            }
        }

        if let Ok(s) = std::env::var("LAZYETL_TIMESTAMP_FORMAT") {
            cfg.timestamp_format = s;
        }

        if let Ok(s) = std::env::var("LAZYETL_DATA_DIR") {
            cfg.data_dir = s;
        }

        cfg
    }

    /// Apply the set fields of `overrides` on top of this config.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.batch_rows {
            self.batch_rows = v;
        }
        if let Some(v) = overrides.row_group_rows {
            self.row_group_rows = v;
        }
        if let Some(v) = overrides.delimiter {
            self.delimiter = v;
        }
        if let Some(v) = overrides.has_header {
            self.has_header = v;
        }
        if let Some(v) = &overrides.timestamp_format {
            self.timestamp_format = v.clone();
        }
        if let Some(v) = &overrides.data_dir {
            self.data_dir = v.clone();
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_rows == 0 {
            return Err(Error::Config("batch_rows must be at least 1".into()));
        }
        if self.row_group_rows == 0 {
            return Err(Error::Config("row_group_rows must be at least 1".into()));
        }
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(Error::Config(format!(
                "delimiter {:?} is not a usable single-byte separator",
                self.delimiter
            )));
        }
        if self.timestamp_format.trim().is_empty() {
            return Err(Error::Config("timestamp_format must not be empty".into()));
        }
        Ok(())
    }

    /// Delimiter as the byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> Result<u8, Error> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| Error::Config(format!("delimiter {:?} is not ASCII", self.delimiter)))
    }
}

/// Sparse overrides, as carried by a pipeline file's `config:` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub batch_rows: Option<usize>,
    pub row_group_rows: Option<usize>,
    pub delimiter: Option<char>,
    pub has_header: Option<bool>,
    pub timestamp_format: Option<String>,
    pub data_dir: Option<String>,
}
