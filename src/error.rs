//! Error types for critq.

use thiserror::Error;

/// The main error type for criteria construction and execution.
#[derive(Debug, Error)]
pub enum CriteriaError {
    /// An accessor could not be mapped to a declared field.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The schema has no field behind `declaring_type::method`.
    #[error("No field declared for accessor {declaring_type}::{method}")]
    FieldNotFound {
        declaring_type: String,
        method: String,
    },

    /// Invalid fluent sequence or invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A CLI filter or sort expression could not be parsed.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// `get()` expected exactly one row.
    #[error("Expected exactly one result, got {0}")]
    NonUniqueResult(usize),

    /// Failure raised by the execution layer, passed through unchanged.
    #[error(transparent)]
    Execution(anyhow::Error),

    /// Schema or config document could not be parsed.
    #[error("Schema parse error: {0}")]
    SchemaParse(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CriteriaError {
    /// Create a resolution error.
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a parse error.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn not_found(declaring_type: impl Into<String>, method: impl Into<String>) -> Self {
        Self::FieldNotFound {
            declaring_type: declaring_type.into(),
            method: method.into(),
        }
    }

    /// True for accessor → field mapping failures.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_) | Self::FieldNotFound { .. })
    }

    /// Duplicate an error recorded inside a builder so every render call can
    /// report it. Execution and IO errors never get recorded, so they collapse
    /// into their message.
    pub(crate) fn replay(&self) -> Self {
        match self {
            Self::Resolution(m) => Self::Resolution(m.clone()),
            Self::FieldNotFound {
                declaring_type,
                method,
            } => Self::not_found(declaring_type.clone(), method.clone()),
            Self::Configuration(m) => Self::Configuration(m.clone()),
            Self::Parse { position, message } => Self::parse(*position, message.clone()),
            Self::NonUniqueResult(n) => Self::NonUniqueResult(*n),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Result type alias for critq operations.
pub type CriteriaResult<T> = Result<T, CriteriaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CriteriaError::not_found("Person", "nickname");
        assert_eq!(
            err.to_string(),
            "No field declared for accessor Person::nickname"
        );
        assert!(err.is_resolution());
    }

    #[test]
    fn test_execution_error_is_transparent() {
        let err = CriteriaError::Execution(anyhow::anyhow!("connection reset"));
        assert_eq!(err.to_string(), "connection reset");
        assert!(!err.is_resolution());
    }

    #[test]
    fn test_replay_keeps_kind() {
        let err = CriteriaError::config("set() on a SELECT");
        assert!(matches!(err.replay(), CriteriaError::Configuration(m) if m == "set() on a SELECT"));
    }
}
