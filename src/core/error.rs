//! Error types for the SVM engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SvmError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Empty problem")]
    EmptyProblem,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Infeasible nu: {0}")]
    InfeasibleNu(f64),

    #[error("Normalization statistics not fitted for group '{0}'")]
    NotFitted(String),

    #[error("Missing attribute '{0}' in model file")]
    MissingAttribute(String),

    #[error("Attribute '{name}' has unexpected type (expected {expected})")]
    AttributeType { name: String, expected: &'static str },

    #[error("Attribute '{name}' has inconsistent size: expected {expected}, got {actual}")]
    AttributeSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, SvmError>;
