//! Conversion between `RowBatch` and Arrow `RecordBatch`.
//!
//! `Duration` columns are stored as plain `Int64` microseconds; the
//! `lazyetl.schema` footer entry records their logical type so read-back can
//! restore it.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, RecordBatch,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{ArrowError, DataType as ArrowType, Field as ArrowField, Schema as ArrowSchema, SchemaRef, TimeUnit};

use lazyetl_core::schema::{DataType, Schema};
use lazyetl_core::types::{Column, RowBatch, Scalar};

/// Field metadata key marking columns whose Arrow type is a physical stand-in.
pub const LOGICAL_TYPE_KEY: &str = "lazyetl.logical_type";

pub fn arrow_data_type(dt: DataType) -> ArrowType {
    match dt {
        DataType::Boolean => ArrowType::Boolean,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 | DataType::Duration => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
    }
}

pub fn arrow_schema(schema: &Schema) -> SchemaRef {
    let fields: Vec<ArrowField> = schema
        .fields
        .iter()
        .map(|f| {
            let field = ArrowField::new(&f.name, arrow_data_type(f.data_type), f.nullable);
            if f.data_type == DataType::Duration {
                field.with_metadata(HashMap::from([(
                    LOGICAL_TYPE_KEY.to_string(),
                    "duration[us]".to_string(),
                )]))
            } else {
                field
            }
        })
        .collect();
    Arc::new(ArrowSchema::new(fields))
}

fn type_error(col: &Column, v: &Scalar) -> ArrowError {
    ArrowError::InvalidArgumentError(format!(
        "column '{}' declared {} holds {v}",
        col.name, col.data_type
    ))
}

fn to_array(col: &Column) -> Result<ArrayRef, ArrowError> {
    macro_rules! build {
        ($arr:ty, $variant:ident) => {{
            let values = col
                .values
                .iter()
                .map(|v| match v {
                    Scalar::Null => Ok(None),
                    Scalar::$variant(x) => Ok(Some(x.clone())),
                    other => Err(type_error(col, other)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Arc::new(<$arr>::from(values)) as ArrayRef
        }};
    }
    Ok(match col.data_type {
        DataType::Boolean => build!(BooleanArray, Bool),
        DataType::Int32 => build!(Int32Array, I32),
        DataType::Int64 => build!(Int64Array, I64),
        DataType::Float64 => build!(Float64Array, F64),
        DataType::Utf8 => build!(StringArray, Str),
        DataType::Timestamp => build!(TimestampMicrosecondArray, Timestamp),
        DataType::Duration => build!(Int64Array, Duration),
    })
}

/// Build a `RecordBatch` laid out as `schema` from `batch`.
pub fn to_record_batch(batch: &RowBatch, schema: SchemaRef) -> Result<RecordBatch, ArrowError> {
    let arrays = schema
        .fields()
        .iter()
        .map(|f| {
            let col = batch.column(f.name()).ok_or_else(|| {
                ArrowError::SchemaError(format!("batch has no column '{}'", f.name()))
            })?;
            to_array(col)
        })
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(schema, arrays)
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T, ArrowError> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        ArrowError::CastError(format!(
            "column '{name}' has Arrow type {}",
            array.data_type()
        ))
    })
}

/// Inverse of `to_record_batch`, typed by `schema`.
pub fn from_record_batch(rb: &RecordBatch, schema: &Schema) -> Result<RowBatch, ArrowError> {
    let mut columns = Vec::with_capacity(schema.len());
    for f in &schema.fields {
        let array = rb
            .column_by_name(&f.name)
            .ok_or_else(|| ArrowError::SchemaError(format!("file has no column '{}'", f.name)))?;
        macro_rules! read {
            ($arr:ty, $ctor:expr) => {{
                let a = downcast::<$arr>(array, &f.name)?;
                (0..a.len())
                    .map(|i| {
                        if a.is_null(i) {
                            Scalar::Null
                        } else {
                            $ctor(a.value(i))
                        }
                    })
                    .collect::<Vec<_>>()
            }};
        }
        let values = match f.data_type {
            DataType::Boolean => read!(BooleanArray, Scalar::Bool),
            DataType::Int32 => read!(Int32Array, Scalar::I32),
            DataType::Int64 => read!(Int64Array, Scalar::I64),
            DataType::Float64 => read!(Float64Array, Scalar::F64),
            DataType::Utf8 => read!(StringArray, |s: &str| Scalar::Str(s.to_string())),
            DataType::Timestamp => read!(TimestampMicrosecondArray, Scalar::Timestamp),
            DataType::Duration => read!(Int64Array, Scalar::Duration),
        };
        columns.push(Column::new(f.name.clone(), f.data_type, values));
    }
    RowBatch::try_with_row_count(columns, rb.num_rows())
        .map_err(|e| ArrowError::InvalidArgumentError(e.to_string()))
}
