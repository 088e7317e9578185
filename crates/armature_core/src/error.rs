//! Core error types for ARMATURE.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value schema violates its structural invariants
    InvalidSchema { reason: String },

    /// Invalid toolkit or tool name
    InvalidName { name: String, reason: String },

    /// Invalid version
    InvalidVersion { reason: String },

    /// Parse error
    ParseError { message: String },

    /// Encoding failure when moving to or from JSON
    Encoding { message: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSchema { reason } => write!(f, "Invalid value schema: {}", reason),
            Self::InvalidName { name, reason } => write!(f, "Invalid name '{}': {}", name, reason),
            Self::InvalidVersion { reason } => write!(f, "Invalid version: {}", reason),
            Self::ParseError { message } => write!(f, "Parse error: {}", message),
            Self::Encoding { message } => write!(f, "Encoding error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            message: err.to_string(),
        }
    }
}

impl From<crate::version::VersionError> for CoreError {
    fn from(err: crate::version::VersionError) -> Self {
        Self::InvalidVersion {
            reason: err.to_string(),
        }
    }
}
