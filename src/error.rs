//! Schema construction errors.
//!
//! These are the only data-independent failures the engine surfaces as hard
//! errors besides I/O. Per-value problems never appear here; they are counted
//! and reported through [`crate::issues::IssueReport`].

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Column '{0}' is defined more than once")]
    DuplicateColumn(String),
    #[error("Table '{0}' must declare a primary key")]
    EmptyPrimaryKey(String),
    #[error("Primary key lists column '{0}' more than once")]
    RepeatedKeyColumn(String),
    #[error("Primary key column '{0}' is not defined in the schema")]
    UnknownKeyColumn(String),
    #[error("Primary key column '{0}' must be required")]
    NullableKeyColumn(String),
    #[error("Primary key column '{0}' must be unique")]
    NonUniqueKeyColumn(String),
    #[error("Column '{column}' lists valid value '{value}' which is not of type {expected}")]
    ValidValueType {
        column: String,
        value: String,
        expected: String,
    },
    #[error("Column '{column}' has an empty range: minimum '{min}' exceeds maximum '{max}'")]
    InvertedRange {
        column: String,
        min: String,
        max: String,
    },
    #[error("Column '{column}' range endpoints '{min}' and '{max}' cannot be ordered")]
    UnorderedRange {
        column: String,
        min: String,
        max: String,
    },
    #[error("Unknown column type '{0}'")]
    UnknownType(String),
    #[error("Constraint '{description}' does not compile: {reason}")]
    InvalidConstraint { description: String, reason: String },
    #[error("Column '{column}' parser is misconfigured: {reason}")]
    InvalidParser { column: String, reason: String },
}
