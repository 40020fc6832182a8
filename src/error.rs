//! Error types for the worksheet compiler.
//!
//! Two families:
//! - Hard errors (`WorksheetError`): bad configuration, bad requests, malformed
//!   visual specs, I/O. These stop the run; the caller fixes the input.
//! - Findings (`models::Finding`): accumulated by the validator and the
//!   self-check, never raised.

use std::path::Path;

use thiserror::Error;

use crate::config::ConfigError;

/// Top-level hard error.
#[derive(Debug, Error)]
pub enum WorksheetError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(String),
}

impl WorksheetError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("{} {}", action, path.display()), source)
    }
}

/// A visual spec outside its model's declared bounds.
///
/// Raised before any drawing happens.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    #[error("unknown visual model '{0}'")]
    UnknownModel(String),

    #[error("{model}: missing required parameter '{param}'")]
    Missing { model: String, param: String },

    #[error("{model}: parameter '{param}' must be {expected}")]
    WrongType {
        model: String,
        param: String,
        expected: String,
    },

    #[error("{model}: parameter '{param}' = {value} outside [{min}, {max}]")]
    OutOfBounds {
        model: String,
        param: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{model}: '{param}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        model: String,
        param: String,
        expected: usize,
        actual: usize,
    },

    #[error("{model}: numerator {numerator} at index {index} outside [0, {denominator}]")]
    NumeratorOutOfRange {
        model: String,
        index: usize,
        numerator: i64,
        denominator: i64,
    },

    #[error("{model}: {message}")]
    Invalid { model: String, message: String },
}

impl ParameterError {
    /// Stable variant name, reported in `render_error` findings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownModel(_) => "UnknownModel",
            Self::Missing { .. } => "Missing",
            Self::WrongType { .. } => "WrongType",
            Self::OutOfBounds { .. } => "OutOfBounds",
            Self::LengthMismatch { .. } => "LengthMismatch",
            Self::NumeratorOutOfRange { .. } => "NumeratorOutOfRange",
            Self::Invalid { .. } => "Invalid",
        }
    }

    pub fn invalid(model: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            model: model.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, WorksheetError>;
