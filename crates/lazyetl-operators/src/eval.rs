//! Column-at-a-time evaluation of `Expr` over a `RowBatch`.
//!
//! Expressions reaching this module were type-checked when the plan was
//! built, so operand type errors here indicate an engine bug and surface as
//! `OpError::Exec` rather than panics.
//!
//! Null handling is three-valued: comparisons and arithmetic with a `Null`
//! operand yield `Null`, `AND`/`OR` follow SQL semantics, and a filter keeps
//! only rows whose predicate is exactly `true`.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Timelike, Utc};

use lazyetl_core::expr::{ArithOp, CmpOp, DatePart, Expr};
use lazyetl_core::schema::parse_timestamp_micros;
use lazyetl_core::types::{RowBatch, Scalar};

use crate::traits::OpError;

/// Evaluate `expr` for every row of `batch`.
pub fn evaluate(expr: &Expr, batch: &RowBatch) -> Result<Vec<Scalar>, OpError> {
    let n = batch.num_rows();
    match expr {
        Expr::Column(name) => batch
            .column(name)
            .map(|c| c.values.clone())
            .ok_or_else(|| OpError::exec(format!("column '{name}' not in batch"))),
        Expr::Literal(v) => Ok(vec![v.clone(); n]),
        Expr::Compare { op, left, right } => {
            let l = evaluate(left, batch)?;
            let r = evaluate(right, batch)?;
            l.iter()
                .zip(&r)
                .enumerate()
                .map(|(row, (a, b))| compare(*op, a, b).map_err(|m| OpError::at_row(row, m)))
                .collect()
        }
        Expr::And(left, right) => {
            let l = evaluate(left, batch)?;
            let r = evaluate(right, batch)?;
            Ok(l.iter().zip(&r).map(|(a, b)| and3(a, b)).collect())
        }
        Expr::Or(left, right) => {
            let l = evaluate(left, batch)?;
            let r = evaluate(right, batch)?;
            Ok(l.iter().zip(&r).map(|(a, b)| or3(a, b)).collect())
        }
        Expr::Not(inner) => Ok(evaluate(inner, batch)?
            .into_iter()
            .map(|v| match v {
                Scalar::Bool(b) => Scalar::Bool(!b),
                _ => Scalar::Null,
            })
            .collect()),
        Expr::Arith { op, left, right } => {
            let l = evaluate(left, batch)?;
            let r = evaluate(right, batch)?;
            l.iter()
                .zip(&r)
                .enumerate()
                .map(|(row, (a, b))| arith(*op, a, b).map_err(|m| OpError::at_row(row, m)))
                .collect()
        }
        Expr::DatePart { part, expr } => evaluate(expr, batch)?
            .iter()
            .enumerate()
            .map(|(row, v)| match v {
                Scalar::Null => Ok(Scalar::Null),
                Scalar::Timestamp(us) => timestamp_part(*us, *part)
                    .map(Scalar::I32)
                    .ok_or_else(|| OpError::at_row(row, format!("timestamp {us}us out of range"))),
                other => Err(OpError::at_row(
                    row,
                    format!("{}() applied to {other}", part.name()),
                )),
            })
            .collect(),
        Expr::ParseTimestamp { expr, format } => evaluate(expr, batch)?
            .iter()
            .enumerate()
            .map(|(row, v)| match v {
                Scalar::Null => Ok(Scalar::Null),
                Scalar::Str(s) => parse_timestamp_micros(s.trim(), format)
                    .map(Scalar::Timestamp)
                    .ok_or_else(|| {
                        OpError::at_row(
                            row,
                            format!("cannot parse '{s}' as a timestamp with format '{format}'"),
                        )
                    }),
                other => Err(OpError::at_row(row, format!("strptime() applied to {other}"))),
            })
            .collect(),
    }
}

/// Keep-mask for `predicate`: `true` only where it evaluates to `true`.
pub fn evaluate_mask(predicate: &Expr, batch: &RowBatch) -> Result<Vec<bool>, OpError> {
    Ok(evaluate(predicate, batch)?
        .iter()
        .map(|v| matches!(v, Scalar::Bool(true)))
        .collect())
}

fn order(a: &Scalar, b: &Scalar) -> Result<Option<Ordering>, String> {
    use Scalar::*;
    Ok(match (a, b) {
        (Null, _) | (_, Null) => None,
        (Str(x), Str(y)) => Some(x.cmp(y)),
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        (Timestamp(x), Timestamp(y)) | (Duration(x), Duration(y)) => Some(x.cmp(y)),
        (I32(_) | I64(_), I32(_) | I64(_)) => a.as_i64().zip(b.as_i64()).map(|(x, y)| x.cmp(&y)),
        (F64(_) | I32(_) | I64(_), F64(_) | I32(_) | I64(_)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(x, y)| float_order(x, y)),
        _ => return Err(format!("cannot compare {a} with {b}")),
    })
}

/// Total order on floats with NaN above every number and equal to itself.
fn float_order(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn compare(op: CmpOp, a: &Scalar, b: &Scalar) -> Result<Scalar, String> {
    let Some(ord) = order(a, b)? else {
        return Ok(Scalar::Null);
    };
    let hit = match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::NotEq => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::LtEq => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::GtEq => ord != Ordering::Less,
    };
    Ok(Scalar::Bool(hit))
}

fn and3(a: &Scalar, b: &Scalar) -> Scalar {
    match (a.as_bool(), b.as_bool()) {
        (Some(false), _) | (_, Some(false)) => Scalar::Bool(false),
        (Some(true), Some(true)) => Scalar::Bool(true),
        _ => Scalar::Null,
    }
}

fn or3(a: &Scalar, b: &Scalar) -> Scalar {
    match (a.as_bool(), b.as_bool()) {
        (Some(true), _) | (_, Some(true)) => Scalar::Bool(true),
        (Some(false), Some(false)) => Scalar::Bool(false),
        _ => Scalar::Null,
    }
}

fn checked_int(op: ArithOp, x: i64, y: i64) -> Result<Scalar, String> {
    let out = match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => {
            if y == 0 {
                return Err("integer division by zero".into());
            }
            return Ok(Scalar::F64(x as f64 / y as f64));
        }
    };
    out.map(Scalar::I64)
        .ok_or_else(|| format!("integer overflow in {x} {} {y}", op.symbol()))
}

fn float(op: ArithOp, x: f64, y: f64) -> Scalar {
    Scalar::F64(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
    })
}

fn arith(op: ArithOp, a: &Scalar, b: &Scalar) -> Result<Scalar, String> {
    use Scalar::*;
    let overflow = || format!("temporal overflow in {a} {} {b}", op.symbol());
    match (a, b) {
        (Null, _) | (_, Null) => Ok(Null),
        (I32(_) | I64(_), I32(_) | I64(_)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => checked_int(op, x, y),
            _ => Err(format!("bad integer operands {a}, {b}")),
        },
        (F64(_) | I32(_) | I64(_), F64(_) | I32(_) | I64(_)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(float(op, x, y)),
            _ => Err(format!("bad numeric operands {a}, {b}")),
        },
        (Timestamp(x), Timestamp(y)) if op == ArithOp::Sub => {
            x.checked_sub(*y).map(Duration).ok_or_else(overflow)
        }
        (Timestamp(x), Duration(y)) if op == ArithOp::Add => {
            x.checked_add(*y).map(Timestamp).ok_or_else(overflow)
        }
        (Timestamp(x), Duration(y)) if op == ArithOp::Sub => {
            x.checked_sub(*y).map(Timestamp).ok_or_else(overflow)
        }
        (Duration(x), Timestamp(y)) if op == ArithOp::Add => {
            x.checked_add(*y).map(Timestamp).ok_or_else(overflow)
        }
        (Duration(x), Duration(y)) if op == ArithOp::Add => {
            x.checked_add(*y).map(Duration).ok_or_else(overflow)
        }
        (Duration(x), Duration(y)) if op == ArithOp::Sub => {
            x.checked_sub(*y).map(Duration).ok_or_else(overflow)
        }
        _ => Err(format!("unsupported arithmetic {a} {} {b}", op.symbol())),
    }
}

/// Calendar component of a microsecond timestamp (UTC, no offset applied).
pub fn timestamp_part(micros: i64, part: DatePart) -> Option<i32> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    let dt = DateTime::<Utc>::from_timestamp(secs, nanos)?;
    let v = match part {
        DatePart::Year => return Some(dt.year()),
        DatePart::Month => dt.month(),
        DatePart::Day => dt.day(),
        DatePart::Hour => dt.hour(),
        DatePart::Minute => dt.minute(),
        DatePart::Second => dt.second(),
    };
    i32::try_from(v).ok()
}
