//! Engine-internal failure carrier, mapped onto ABI status cells.

use tengra_abi::code;
use thiserror::Error;

/// A failed engine call: an ABI status code plus a message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub(crate) struct EngineError {
    pub code: i32,
    pub message: String,
}

pub(crate) type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_ARGUMENT, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(code::NOT_FOUND, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(code::ALREADY_EXISTS, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(code::FAILED_PRECONDITION, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(code::UNIMPLEMENTED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(code::INTERNAL, message)
    }
}
