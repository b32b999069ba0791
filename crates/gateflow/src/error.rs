//! Error types for gate flows.

use thiserror::Error;

use crate::backend::BackendError;

/// Gate flow operation result type.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Message reported when a token does not resolve to a live session.
pub const INVALID_KEY: &str = "Invalid key";

/// Message reported when a gate is not reachable from the active position.
pub const INVALID_GATE: &str = "Invalid gate";

/// Gate flow errors.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Resume was called without a usable token
    #[error("Key is not defined")]
    KeyNotDefined,

    /// A gate operation was called without a gate name
    #[error("Gate was not defined")]
    GateNotDefined,

    /// Cipher input was empty
    #[error("Value must be string with non-zero length.")]
    EmptyValue,

    /// Token is malformed, foreign, expired or already destroyed
    #[error("Invalid key")]
    InvalidKey,

    /// Knock validation failed; holds every reason in order
    #[error("{}", .0.join(", "))]
    Rejected(Vec<String>),

    /// Stored record cannot be interpreted with the current schema
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Schema definition is unusable
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Store configuration is unusable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The OS random source failed
    #[error("Entropy source failed: {0}")]
    Entropy(String),

    /// Backend failure, passed through untouched
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Record (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    /// Create an invalid config error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True when the error means the session is gone or was never ours.
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::InvalidKey)
            || matches!(self, Self::Rejected(errors) if errors.iter().any(|e| e == INVALID_KEY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_messages() {
        assert_eq!(FlowError::KeyNotDefined.to_string(), "Key is not defined");
        assert_eq!(FlowError::GateNotDefined.to_string(), "Gate was not defined");
        assert_eq!(FlowError::InvalidKey.to_string(), INVALID_KEY);
        assert_eq!(
            FlowError::EmptyValue.to_string(),
            "Value must be string with non-zero length."
        );
    }

    #[test]
    fn test_rejected_joins_messages() {
        let err = FlowError::Rejected(vec![INVALID_KEY.to_string(), INVALID_GATE.to_string()]);
        assert_eq!(err.to_string(), "Invalid key, Invalid gate");
        assert!(err.is_invalid_key());

        let err = FlowError::Rejected(vec![INVALID_GATE.to_string()]);
        assert_eq!(err.to_string(), "Invalid gate");
        assert!(!err.is_invalid_key());
    }
}
