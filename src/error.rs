//! Error types shared by the data loader, the models and the experiments.

use std::fmt;
use std::io;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RbmError>;

#[derive(Debug)]
pub enum RbmError {
    /// Reading or writing a file failed.
    Io(io::Error),

    /// A configuration or results file could not be (de)serialised.
    Json(serde_json::Error),

    /// An IDX image or label file is malformed.
    InvalidIdx(String),

    /// Input width does not match the layer it is fed to.
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    /// A hyperparameter is outside its valid range.
    InvalidConfiguration { parameter: String, reason: String },

    /// An operation needed at least one element.
    EmptyCollection { collection: String },
}

impl RbmError {
    pub fn dimension(expected: usize, got: usize, context: impl Into<String>) -> Self {
        RbmError::DimensionMismatch {
            expected,
            got,
            context: context.into(),
        }
    }

    pub fn config(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        RbmError::InvalidConfiguration {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn empty(collection: impl Into<String>) -> Self {
        RbmError::EmptyCollection {
            collection: collection.into(),
        }
    }
}

impl fmt::Display for RbmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RbmError::Io(e) => write!(f, "I/O error: {}", e),
            RbmError::Json(e) => write!(f, "JSON error: {}", e),
            RbmError::InvalidIdx(msg) => write!(f, "invalid IDX data: {}", msg),
            RbmError::DimensionMismatch {
                expected,
                got,
                context,
            } => write!(
                f,
                "dimension mismatch in {}: expected {}, got {}",
                context, expected, got
            ),
            RbmError::InvalidConfiguration { parameter, reason } => {
                write!(f, "invalid configuration for '{}': {}", parameter, reason)
            }
            RbmError::EmptyCollection { collection } => {
                write!(f, "{} is empty", collection)
            }
        }
    }
}

impl std::error::Error for RbmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RbmError::Io(e) => Some(e),
            RbmError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RbmError {
    fn from(e: io::Error) -> Self {
        RbmError::Io(e)
    }
}

impl From<serde_json::Error> for RbmError {
    fn from(e: serde_json::Error) -> Self {
        RbmError::Json(e)
    }
}
