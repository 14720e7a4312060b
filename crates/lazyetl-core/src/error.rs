use thiserror::Error;

use crate::schema::DataType;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}

/// Validation/typing failures against the schema registry.
///
/// `TypeMismatch` and `MissingField` are raised per row during a scan and are
/// recovered by skipping the row; the others stop the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("column '{column}' is missing from the header of {file}")]
    UnknownColumn { column: String, file: String },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("value '{value}' in column '{column}' is not a valid {expected}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        value: String,
    },

    #[error("row has no field for column '{column}'")]
    MissingField { column: String },
}

impl SchemaError {
    /// Row-level errors skip the offending row instead of aborting.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            SchemaError::TypeMismatch { .. } | SchemaError::MissingField { .. }
        )
    }
}

/// Plan construction/optimization failures. Always raised before any I/O.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("unknown column '{column}' referenced by {context}")]
    UnknownReference { column: String, context: String },

    #[error("type error in {context}: {message}")]
    TypeMismatch { context: String, message: String },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl From<SchemaError> for PlanError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::DuplicateColumn(c) => PlanError::DuplicateColumn(c),
            other => PlanError::InvalidPlan(other.to_string()),
        }
    }
}
