//! Structured success/error results for engine-facing calls.

use std::ffi::CStr;

use tengra_abi::{code, RawStatus};
use thiserror::Error;

use crate::platform::Engine;

/// Status codes shared with the engine ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    Ok = code::OK,
    Cancelled = code::CANCELLED,
    Unknown = code::UNKNOWN,
    InvalidArgument = code::INVALID_ARGUMENT,
    NotFound = code::NOT_FOUND,
    AlreadyExists = code::ALREADY_EXISTS,
    PermissionDenied = code::PERMISSION_DENIED,
    ResourceExhausted = code::RESOURCE_EXHAUSTED,
    FailedPrecondition = code::FAILED_PRECONDITION,
    Aborted = code::ABORTED,
    OutOfRange = code::OUT_OF_RANGE,
    Unimplemented = code::UNIMPLEMENTED,
    Internal = code::INTERNAL,
    Unavailable = code::UNAVAILABLE,
    DataLoss = code::DATA_LOSS,
    Unauthenticated = code::UNAUTHENTICATED,
}

impl Code {
    /// Decodes an ABI tag; anything out of range is `Unknown`.
    pub fn from_raw(tag: i32) -> Code {
        match tag {
            code::OK => Code::Ok,
            code::CANCELLED => Code::Cancelled,
            code::INVALID_ARGUMENT => Code::InvalidArgument,
            code::NOT_FOUND => Code::NotFound,
            code::ALREADY_EXISTS => Code::AlreadyExists,
            code::PERMISSION_DENIED => Code::PermissionDenied,
            code::RESOURCE_EXHAUSTED => Code::ResourceExhausted,
            code::FAILED_PRECONDITION => Code::FailedPrecondition,
            code::ABORTED => Code::Aborted,
            code::OUT_OF_RANGE => Code::OutOfRange,
            code::UNIMPLEMENTED => Code::Unimplemented,
            code::INTERNAL => Code::Internal,
            code::UNAVAILABLE => Code::Unavailable,
            code::DATA_LOSS => Code::DataLoss,
            code::UNAUTHENTICATED => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }
}

/// A structured failure: a [`Code`] plus a message.
///
/// `Code::Ok` never appears inside an error; successful calls simply
/// return `Ok`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Status {
        Status {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Status {
        Status::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Status {
        Status::new(Code::NotFound, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Status {
        Status::new(Code::OutOfRange, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Status {
        Status::new(Code::ResourceExhausted, message)
    }

    pub fn internal(message: impl Into<String>) -> Status {
        Status::new(Code::Internal, message)
    }
}

/// RAII wrapper over the engine's status out-parameter.
///
/// Allocated per call, checked once, released on drop regardless of the
/// exit path.
pub(crate) struct StatusGuard<'e> {
    engine: &'e Engine,
    raw: *mut RawStatus,
}

impl<'e> StatusGuard<'e> {
    pub fn new(engine: &'e Engine) -> StatusGuard<'e> {
        let raw = unsafe { (engine.api().status_new)() };
        StatusGuard { engine, raw }
    }

    pub fn ptr(&self) -> *mut RawStatus {
        self.raw
    }

    /// Reads the cell back as a Result.
    pub fn check(&self) -> Result<(), Status> {
        let api = self.engine.api();
        let tag = unsafe { (api.status_code)(self.raw) };
        if tag == code::OK {
            return Ok(());
        }
        let message = unsafe {
            let ptr = (api.status_message)(self.raw);
            if ptr.is_null() {
                String::new()
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        };
        Err(Status::new(Code::from_raw(tag), message))
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        unsafe { (self.engine.api().status_delete)(self.raw) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_decode_to_unknown() {
        assert_eq!(Code::from_raw(999), Code::Unknown);
        assert_eq!(Code::from_raw(-1), Code::Unknown);
        assert_eq!(Code::from_raw(code::NOT_FOUND), Code::NotFound);
    }

    #[test]
    fn status_displays_code_and_message() {
        let status = Status::invalid_argument("bad shape");
        assert_eq!(status.to_string(), "InvalidArgument: bad shape");
    }
}
