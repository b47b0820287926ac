//! Error types for the binding crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::status::{Code, Status};

/// Errors surfaced by the binding.
///
/// Engine-reported and marshaling failures travel as [`Status`] values;
/// a missing or incompatible engine library is kept distinct because it
/// is a deployment defect, not a data defect.
#[derive(Debug, Error)]
pub enum Error {
    /// The native engine library could not be located or loaded.
    #[error("native engine unavailable at {}: {reason}", path.display())]
    EngineUnavailable { path: PathBuf, reason: String },

    /// A structured failure from the engine or from marshaling.
    #[error(transparent)]
    Status(#[from] Status),
}

impl Error {
    /// The status code, when this error carries one.
    pub fn code(&self) -> Option<Code> {
        match self {
            Error::EngineUnavailable { .. } => None,
            Error::Status(status) => Some(status.code),
        }
    }
}

/// Specialized Result type for binding operations.
pub type Result<T> = std::result::Result<T, Error>;
