//! Schema registry: column name → primitive type, plus typing of raw text.
//!
//! A `Schema` is defined once at startup and shared by `Arc` across every
//! plan node. `validate_header` binds it to a concrete source file and
//! `DataType::parse_value` turns one untyped field into a `Scalar`.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::Scalar;

/// Default layout of timestamp strings in the source files.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Utf8,
    /// Microseconds since the Unix epoch, no timezone.
    Timestamp,
    /// Microseconds.
    Duration,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }

    /// Types a source may declare. The rest only come out of expressions.
    pub fn is_source_type(self) -> bool {
        matches!(
            self,
            DataType::Int64 | DataType::Float64 | DataType::Utf8 | DataType::Timestamp
        )
    }

    /// Type one raw text field.
    ///
    /// Empty input becomes `Scalar::Null` for nullable fields; everything else
    /// must parse as the declared type.
    pub fn parse_value(
        self,
        raw: &str,
        nullable: bool,
        timestamp_format: &str,
    ) -> Result<Scalar, SchemaError> {
        let trimmed = raw.trim_matches(|c| c == ' ' || c == '\t');
        if trimmed.is_empty() && self != DataType::Utf8 {
            return if nullable {
                Ok(Scalar::Null)
            } else {
                Err(self.mismatch(raw))
            };
        }
        match self {
            DataType::Utf8 => {
                if raw.is_empty() && nullable {
                    Ok(Scalar::Null)
                } else {
                    Ok(Scalar::Str(raw.to_string()))
                }
            }
            DataType::Int64 => parse_integer(trimmed)
                .map(Scalar::I64)
                .ok_or_else(|| self.mismatch(raw)),
            DataType::Int32 => parse_integer(trimmed)
                .and_then(|v| i32::try_from(v).ok())
                .map(Scalar::I32)
                .ok_or_else(|| self.mismatch(raw)),
            DataType::Float64 => trimmed
                .parse::<f64>()
                .map(Scalar::F64)
                .map_err(|_| self.mismatch(raw)),
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Scalar::Bool(true)),
                "false" | "f" | "0" => Ok(Scalar::Bool(false)),
                _ => Err(self.mismatch(raw)),
            },
            DataType::Timestamp => parse_timestamp_micros(trimmed, timestamp_format)
                .map(Scalar::Timestamp)
                .ok_or_else(|| self.mismatch(raw)),
            DataType::Duration => trimmed
                .parse::<i64>()
                .map(Scalar::Duration)
                .map_err(|_| self.mismatch(raw)),
        }
    }

    fn mismatch(self, raw: &str) -> SchemaError {
        SchemaError::TypeMismatch {
            column: String::new(),
            expected: self,
            value: raw.to_string(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Boolean => "Boolean",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float64 => "Float64",
            DataType::Utf8 => "Utf8",
            DataType::Timestamp => "Timestamp",
            DataType::Duration => "Duration",
        };
        f.write_str(s)
    }
}

/// Integer counts sometimes come out of vendor exports as `"2.0"`.
fn parse_integer(s: &str) -> Option<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let (whole, frac) = s.split_once('.')?;
    if !frac.is_empty() && frac.bytes().all(|b| b == b'0') {
        whole.parse::<i64>().ok()
    } else {
        None
    }
}

/// Parse `s` with a chrono format string into epoch microseconds.
pub fn parse_timestamp_micros(s: &str, format: &str) -> Option<i64> {
    let dt = NaiveDateTime::parse_from_str(s, format).ok()?;
    Some(dt.and_utc().timestamp_micros())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Type one raw field of this column; errors carry the column name.
    pub fn parse(&self, raw: &str, timestamp_format: &str) -> Result<Scalar, SchemaError> {
        self.data_type
            .parse_value(raw, self.nullable, timestamp_format)
            .map_err(|e| match e {
                SchemaError::TypeMismatch {
                    expected, value, ..
                } => SchemaError::TypeMismatch {
                    column: self.name.clone(),
                    expected,
                    value,
                },
                other => other,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names.
    pub fn try_new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(fields.len());
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(f.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Keep only `columns`, in the order given.
    pub fn select(&self, columns: &[String]) -> Option<Schema> {
        let fields = columns
            .iter()
            .map(|c| self.field_by_name(c).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Schema { fields })
    }

    /// Schema with `field` replacing the same-named field in place, or appended.
    pub fn with_field(&self, field: Field) -> Schema {
        let mut fields = self.fields.clone();
        match self.index_of(&field.name) {
            Some(idx) => fields[idx] = field,
            None => fields.push(field),
        }
        Schema { fields }
    }

    /// Bind the declared columns to positions in a raw header row.
    ///
    /// Header columns the schema does not mention are ignored.
    pub fn validate_header<S: AsRef<str>>(
        &self,
        raw_header: &[S],
        source: &str,
    ) -> Result<HeaderBinding, SchemaError> {
        let header: Vec<&str> = raw_header.iter().map(|h| h.as_ref().trim()).collect();
        let mut positions = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            let pos = header.iter().position(|h| *h == f.name).ok_or_else(|| {
                SchemaError::UnknownColumn {
                    column: f.name.clone(),
                    file: source.to_string(),
                }
            })?;
            positions.push(pos);
        }
        Ok(HeaderBinding {
            positions,
            header_len: header.len(),
        })
    }
}

/// Result of `Schema::validate_header`: where each declared field lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBinding {
    /// `positions[i]` is the raw column index of schema field `i`.
    pub positions: Vec<usize>,
    pub header_len: usize,
}

impl HeaderBinding {
    pub fn position(&self, field_idx: usize) -> Option<usize> {
        self.positions.get(field_idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip_like() -> Schema {
        Schema::try_new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("pickup", DataType::Timestamp, false),
            Field::new("fare", DataType::Float64, true),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_columns_rejected() {
        let err = Schema::try_new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("a", DataType::Utf8, false),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn(c) if c == "a"));
    }

    #[test]
    fn header_binding_tolerates_reordering_and_extras() {
        let schema = trip_like();
        let binding = schema
            .validate_header(&["fare", "extra", "pickup", "id"], "f.csv")
            .unwrap();
        assert_eq!(binding.positions, vec![3, 2, 0]);
        assert_eq!(binding.header_len, 4);
    }

    #[test]
    fn header_missing_column_is_unknown_column() {
        let schema = trip_like();
        let err = schema.validate_header(&["id", "fare"], "f.csv").unwrap_err();
        match err {
            SchemaError::UnknownColumn { column, file } => {
                assert_eq!(column, "pickup");
                assert_eq!(file, "f.csv");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn line_breaks_are_not_trimmed_from_numbers() {
        let fmt = DEFAULT_TIMESTAMP_FORMAT;
        assert_eq!(
            DataType::Int64.parse_value(" 4\t", false, fmt).unwrap(),
            Scalar::I64(4)
        );
        let err = DataType::Int64.parse_value("4\n", false, fmt).unwrap_err();
        assert!(err.is_row_level());
        assert!(DataType::Float64.parse_value("\r\n1.5", false, fmt).is_err());
        assert!(DataType::Timestamp
            .parse_value("1970-01-01 00:00:01\n", false, fmt)
            .is_err());
        assert!(!SchemaError::DuplicateColumn("a".into()).is_row_level());
    }

    #[test]
    fn parse_values() {
        let fmt = DEFAULT_TIMESTAMP_FORMAT;
        assert_eq!(
            DataType::Int64.parse_value("2", false, fmt).unwrap(),
            Scalar::I64(2)
        );
        assert_eq!(
            DataType::Int64.parse_value("2.0", false, fmt).unwrap(),
            Scalar::I64(2)
        );
        assert!(DataType::Int64.parse_value("2.5", false, fmt).is_err());
        assert!(DataType::Float64.parse_value("abc", false, fmt).is_err());
        assert_eq!(
            DataType::Float64.parse_value("", true, fmt).unwrap(),
            Scalar::Null
        );
        assert!(DataType::Float64.parse_value("", false, fmt).is_err());
        assert_eq!(
            DataType::Timestamp
                .parse_value("1970-01-01 00:00:01", false, fmt)
                .unwrap(),
            Scalar::Timestamp(1_000_000)
        );
        assert!(DataType::Timestamp
            .parse_value("2021-13-45 99:00:00", false, fmt)
            .is_err());
    }
}
