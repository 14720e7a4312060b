//! Lightweight typed values, columns, and row batches.
//!
//! The sink converts these to Arrow arrays when writing; everything upstream
//! works on this representation so `core` stays free of Arrow.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schema::{DataType, Field, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// Microseconds.
    Duration(i64),
}

impl Scalar {
    /// `None` for `Null`, which fits any nullable column.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Timestamp(_) => Some(DataType::Timestamp),
            Scalar::Duration(_) => Some(DataType::Duration),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I32(v) => Some(f64::from(*v)),
            Scalar::I64(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I32(v) => Some(i64::from(*v)),
            Scalar::I64(v) | Scalar::Timestamp(v) | Scalar::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v:?}"),
            Scalar::Str(s) => write!(f, "'{s}'"),
            Scalar::Timestamp(v) => write!(f, "timestamp({v}us)"),
            Scalar::Duration(v) => write!(f, "duration({v}us)"),
        }
    }
}

/// A named, homogeneous sequence of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Scalar>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep the values whose mask bit is set.
    pub fn filter(&self, mask: &[bool]) -> Column {
        let values = self
            .values
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| v.clone())
            .collect();
        Column {
            name: self.name.clone(),
            data_type: self.data_type,
            values,
        }
    }
}

/// A bounded set of equal-length columns.
///
/// The row count is stored explicitly so a batch that carries no columns
/// (a projection of pure literals) still knows how many rows it has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    pub columns: Vec<Column>,
    row_count: usize,
}

impl RowBatch {
    /// Build a batch, checking every column has the same length.
    pub fn try_new(columns: Vec<Column>) -> Result<Self, Error> {
        let row_count = columns.first().map(|c| c.len()).unwrap_or(0);
        Self::try_with_row_count(columns, row_count)
    }

    pub fn try_with_row_count(columns: Vec<Column>, row_count: usize) -> Result<Self, Error> {
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(Error::Invariant(format!(
                "column '{}' has {} rows, batch has {}",
                bad.name,
                bad.len(),
                row_count
            )));
        }
        Ok(Self { columns, row_count })
    }

    pub fn num_rows(&self) -> usize {
        self.row_count
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Schema of the batch as seen by its values (every field nullable).
    pub fn schema(&self) -> Schema {
        Schema {
            fields: self
                .columns
                .iter()
                .map(|c| Field::new(c.name.clone(), c.data_type, true))
                .collect(),
        }
    }

    /// Keep the rows whose mask bit is set. `mask` must have `num_rows` bits.
    pub fn filter(&self, mask: &[bool]) -> Result<RowBatch, Error> {
        if mask.len() != self.row_count {
            return Err(Error::Invariant(format!(
                "filter mask has {} entries, batch has {} rows",
                mask.len(),
                self.row_count
            )));
        }
        let kept = mask.iter().filter(|k| **k).count();
        Ok(RowBatch {
            columns: self.columns.iter().map(|c| c.filter(mask)).collect(),
            row_count: kept,
        })
    }

    /// Move out the named columns, in the order given.
    pub fn select(self, names: &[String]) -> Result<RowBatch, Error> {
        let row_count = self.row_count;
        let mut slots: Vec<Option<Column>> = self.columns.into_iter().map(Some).collect();
        let mut out: Vec<Column> = Vec::with_capacity(names.len());
        for name in names {
            let moved = slots.iter_mut().find_map(|slot| {
                if slot.as_ref().is_some_and(|c| &c.name == name) {
                    slot.take()
                } else {
                    None
                }
            });
            let col = match moved {
                Some(col) => col,
                None => out
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .ok_or_else(|| Error::Invariant(format!("column '{name}' not in batch")))?,
            };
            out.push(col);
        }
        Ok(RowBatch {
            columns: out,
            row_count,
        })
    }

    /// Add `column`, replacing an existing column of the same name in place.
    pub fn with_column(mut self, column: Column) -> Result<RowBatch, Error> {
        if column.len() != self.row_count {
            return Err(Error::Invariant(format!(
                "column '{}' has {} rows, batch has {}",
                column.name,
                column.len(),
                self.row_count
            )));
        }
        match self.column_index(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Values of row `idx` across all columns, for debugging and tests.
    pub fn row(&self, idx: usize) -> Option<Vec<Scalar>> {
        if idx >= self.row_count {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx].clone()).collect())
    }
}
