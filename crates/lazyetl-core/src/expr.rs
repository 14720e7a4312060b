//! Expression tree shared by derive and filter nodes.
//!
//! Expressions are checked against the schema visible at their point in the
//! chain when the plan is built (`Expr::resolve`), so evaluation never sees
//! an unknown column or an ill-typed operand.

use std::collections::BTreeSet;
use std::fmt;
use std::ops;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::schema::{DataType, Field, Schema, DEFAULT_TIMESTAMP_FORMAT};
use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn name(self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(String),
    Literal(Scalar),
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    DatePart {
        part: DatePart,
        expr: Box<Expr>,
    },
    /// Parse a string column into a timestamp with a chrono format string.
    ParseTimestamp {
        expr: Box<Expr>,
        #[serde(default = "default_timestamp_format")]
        format: String,
    },
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

pub fn lit(value: impl Into<Scalar>) -> Expr {
    Expr::Literal(value.into())
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl Expr {
    fn compare(self, op: CmpOp, other: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.compare(CmpOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.compare(CmpOp::GtEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.compare(CmpOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.compare(CmpOp::LtEq, other)
    }

    pub fn equals(self, other: Expr) -> Expr {
        self.compare(CmpOp::Eq, other)
    }

    pub fn not_equals(self, other: Expr) -> Expr {
        self.compare(CmpOp::NotEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    pub fn date_part(self, part: DatePart) -> Expr {
        Expr::DatePart {
            part,
            expr: Box::new(self),
        }
    }

    pub fn year(self) -> Expr {
        self.date_part(DatePart::Year)
    }

    pub fn strptime(self, format: impl Into<String>) -> Expr {
        Expr::ParseTimestamp {
            expr: Box::new(self),
            format: format.into(),
        }
    }

    fn arith(self, op: ArithOp, other: Expr) -> Expr {
        Expr::Arith {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Free column references, sorted.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Column(name) => {
                out.insert(name.clone());
            }
            Expr::Literal(_) => {}
            Expr::Compare { left, right, .. }
            | Expr::Arith { left, right, .. }
            | Expr::And(left, right)
            | Expr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(inner)
            | Expr::DatePart { expr: inner, .. }
            | Expr::ParseTimestamp { expr: inner, .. } => inner.collect_columns(out),
        }
    }

    /// Flatten nested ANDs into their conjuncts, left to right.
    pub fn split_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::And(left, right) => {
                let mut out = left.split_conjuncts();
                out.extend(right.split_conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// AND together `exprs`; `None` when empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|acc, e| acc.and(e))
    }

    /// Type-check against `schema`, returning the result type and nullability.
    ///
    /// `context` names the plan node in error messages.
    pub fn resolve(&self, schema: &Schema, context: &str) -> Result<(DataType, bool), PlanError> {
        let mismatch = |message: String| PlanError::TypeMismatch {
            context: context.to_string(),
            message,
        };
        match self {
            Expr::Column(name) => schema
                .field_by_name(name)
                .map(|f| (f.data_type, f.nullable))
                .ok_or_else(|| PlanError::UnknownReference {
                    column: name.clone(),
                    context: context.to_string(),
                }),
            Expr::Literal(v) => v
                .data_type()
                .map(|dt| (dt, false))
                .ok_or_else(|| mismatch("untyped NULL literal".into())),
            Expr::Compare { op, left, right } => {
                let (l, ln) = left.resolve(schema, context)?;
                let (r, rn) = right.resolve(schema, context)?;
                let ok = (l.is_numeric() && r.is_numeric()) || l == r;
                if !ok {
                    return Err(mismatch(format!(
                        "cannot compare {l} {} {r}",
                        op.symbol()
                    )));
                }
                Ok((DataType::Boolean, ln || rn))
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                let (l, ln) = left.resolve(schema, context)?;
                let (r, rn) = right.resolve(schema, context)?;
                if l != DataType::Boolean || r != DataType::Boolean {
                    return Err(mismatch(format!(
                        "boolean connective over {l} and {r}"
                    )));
                }
                Ok((DataType::Boolean, ln || rn))
            }
            Expr::Not(inner) => {
                let (t, n) = inner.resolve(schema, context)?;
                if t != DataType::Boolean {
                    return Err(mismatch(format!("NOT over {t}")));
                }
                Ok((DataType::Boolean, n))
            }
            Expr::Arith { op, left, right } => {
                let (l, ln) = left.resolve(schema, context)?;
                let (r, rn) = right.resolve(schema, context)?;
                let out = arith_result_type(*op, l, r).ok_or_else(|| {
                    mismatch(format!("unsupported arithmetic {l} {} {r}", op.symbol()))
                })?;
                Ok((out, ln || rn))
            }
            Expr::DatePart { part, expr } => {
                let (t, n) = expr.resolve(schema, context)?;
                if t != DataType::Timestamp {
                    return Err(mismatch(format!("{}() needs a Timestamp, got {t}", part.name())));
                }
                Ok((DataType::Int32, n))
            }
            Expr::ParseTimestamp { expr, .. } => {
                let (t, n) = expr.resolve(schema, context)?;
                if t != DataType::Utf8 {
                    return Err(mismatch(format!("strptime() needs a Utf8, got {t}")));
                }
                Ok((DataType::Timestamp, n))
            }
        }
    }

    /// Output field for a derived column named `name`.
    pub fn to_field(&self, name: &str, schema: &Schema, context: &str) -> Result<Field, PlanError> {
        let (data_type, nullable) = self.resolve(schema, context)?;
        Ok(Field::new(name, data_type, nullable))
    }
}

/// Result type of `l op r`, or `None` when the combination is not supported.
pub fn arith_result_type(op: ArithOp, l: DataType, r: DataType) -> Option<DataType> {
    use DataType::*;
    if l.is_numeric() && r.is_numeric() {
        return Some(match op {
            ArithOp::Div => Float64,
            _ if l == Float64 || r == Float64 => Float64,
            _ => Int64,
        });
    }
    match (op, l, r) {
        (ArithOp::Sub, Timestamp, Timestamp) => Some(Duration),
        (ArithOp::Add | ArithOp::Sub, Timestamp, Duration) => Some(Timestamp),
        (ArithOp::Add, Duration, Timestamp) => Some(Timestamp),
        (ArithOp::Add | ArithOp::Sub, Duration, Duration) => Some(Duration),
        _ => None,
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Add, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Sub, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Mul, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Div, rhs)
    }
}

impl ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{name}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::And(l, r) => write!(f, "({l}) AND ({r})"),
            Expr::Or(l, r) => write!(f, "({l}) OR ({r})"),
            Expr::Not(e) => write!(f, "NOT ({e})"),
            Expr::Arith { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::DatePart { part, expr } => write!(f, "{}({expr})", part.name()),
            Expr::ParseTimestamp { expr, format } => write!(f, "strptime({expr}, '{format}')"),
        }
    }
}
