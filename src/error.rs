//! Error codes and the uniform `(code, message)` operation-error channel.
//!
//! # C++ Reference
//! - `firestore/src/include/firebase/firestore/firestore_errors.h` (Error enum)
//! - `admob/src/common/admob_common.cc` (fixed message strings matching codes)
//! - `app/src/include/firebase/app.h` (InitResult)
//!
//! Error codes are a stable, dense, append-only sequence starting at 0: they
//! are consumed verbatim by bindings in other languages, so variants are never
//! renumbered or removed. A failed asynchronous operation is always reported
//! as a non-zero code plus a human-readable message on its completed future,
//! never as a panic or an exception crossing the async boundary.

use thiserror::Error;

/// Error code reported by an operation that finished without failure.
pub const SUCCESS: i32 = 0;

/// Stable error codes shared by all asynchronous operations in the SDK core.
///
/// The numeric values follow the canonical gRPC status space so that codes
/// surfaced by transport-backed services can be passed through unchanged.
/// New codes are appended at the end of the sequence only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// The operation completed successfully.
    Ok = 0,
    /// The operation was cancelled before it could complete.
    Cancelled = 1,
    /// The operation failed for an unknown reason.
    Unknown = 2,
    /// The caller specified an invalid argument.
    InvalidArgument = 3,
    /// The deadline expired before the operation could complete.
    DeadlineExceeded = 4,
    /// The requested entity was not found.
    NotFound = 5,
    /// The entity the caller attempted to create already exists.
    AlreadyExists = 6,
    /// The caller does not have permission to execute the operation.
    PermissionDenied = 7,
    /// A per-project quota or system resource has been exhausted.
    ResourceExhausted = 8,
    /// The system is not in a state required for the operation.
    FailedPrecondition = 9,
    /// The operation was aborted, typically due to a concurrency conflict.
    Aborted = 10,
    /// The operation was attempted past the valid range.
    OutOfRange = 11,
    /// The operation is not implemented or not supported.
    Unimplemented = 12,
    /// An internal invariant was broken.
    Internal = 13,
    /// The service is currently unavailable.
    Unavailable = 14,
    /// Unrecoverable data loss or corruption.
    DataLoss = 15,
    /// The request does not have valid authentication credentials.
    Unauthenticated = 16,
}

/// Messages for every code in [`ErrorCode`], indexed by code value.
///
/// Kept in lockstep with the enum; both are append-only.
const ERROR_MESSAGES: [&str; 17] = [
    "",
    "The operation was cancelled.",
    "The operation failed for an unknown reason.",
    "An invalid argument was provided.",
    "The operation timed out before it could complete.",
    "The requested entity was not found.",
    "The entity already exists.",
    "Permission denied.",
    "Resource has been exhausted.",
    "The system is not in a state required for the operation.",
    "The operation was aborted.",
    "The operation was attempted past the valid range.",
    "The operation is not implemented or supported.",
    "An internal error has occurred.",
    "The service is currently unavailable.",
    "Unrecoverable data loss or corruption.",
    "The request does not have valid authentication credentials.",
];

impl ErrorCode {
    /// The wire value of this code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// The fixed human-readable message for this code.
    pub fn message(self) -> &'static str {
        ERROR_MESSAGES[self as usize]
    }

    /// Look up a code by wire value.
    pub fn from_code(code: i32) -> Option<ErrorCode> {
        match code {
            0 => Some(ErrorCode::Ok),
            1 => Some(ErrorCode::Cancelled),
            2 => Some(ErrorCode::Unknown),
            3 => Some(ErrorCode::InvalidArgument),
            4 => Some(ErrorCode::DeadlineExceeded),
            5 => Some(ErrorCode::NotFound),
            6 => Some(ErrorCode::AlreadyExists),
            7 => Some(ErrorCode::PermissionDenied),
            8 => Some(ErrorCode::ResourceExhausted),
            9 => Some(ErrorCode::FailedPrecondition),
            10 => Some(ErrorCode::Aborted),
            11 => Some(ErrorCode::OutOfRange),
            12 => Some(ErrorCode::Unimplemented),
            13 => Some(ErrorCode::Internal),
            14 => Some(ErrorCode::Unavailable),
            15 => Some(ErrorCode::DataLoss),
            16 => Some(ErrorCode::Unauthenticated),
            _ => None,
        }
    }
}

/// Message for an arbitrary integer code.
///
/// Returns the empty string for any input outside the table, including
/// negative values, so bindings can call this with untrusted codes.
pub fn error_message(code: i32) -> &'static str {
    if code < 0 {
        return "";
    }
    ERROR_MESSAGES.get(code as usize).copied().unwrap_or("")
}

/// Error half of the uniform `(code, message)` operation channel.
///
/// Carried by platform bridges into future completion; also what
/// [`Future::value`](crate::future::Future::value) yields when an operation
/// completed with a non-zero code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operation failed with code {code}: {message}")]
pub struct OperationError {
    /// Domain-specific error code, non-zero for failures.
    pub code: i32,
    /// Human-readable description, may be empty.
    pub message: String,
}

impl OperationError {
    /// Create an operation error from a raw code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an operation error carrying a standard code and its table message.
    pub fn from_error_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
        }
    }
}

impl From<ErrorCode> for OperationError {
    fn from(code: ErrorCode) -> Self {
        Self::from_error_code(code)
    }
}

/// Result of initializing a service against its platform backend.
///
/// Distinct from the operation-error channel: a missing platform dependency
/// prevents any operation from being issued at all, so it is reported by the
/// initialization entry point rather than through a completed future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitResult {
    /// The service initialized and operations may be issued.
    Success,
    /// A required platform dependency is missing or failed to load.
    FailedMissingDependency,
}

/// Errors raised by [`App`](crate::App) configuration and lookup.
#[derive(Debug, Error)]
pub enum AppError {
    /// API key not configured
    #[error("API key not configured")]
    ApiKeyNotConfigured,

    /// Project ID missing from the options
    #[error("Project ID cannot be empty")]
    ProjectIdNotConfigured,

    /// Named app has not been created yet
    #[error("Firebase App '{0}' not found. Call App::create() first.")]
    NotFound(String),

    /// App configuration JSON could not be parsed
    #[error("Invalid app configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_and_stable() {
        assert_eq!(ErrorCode::Ok.code(), 0);
        assert_eq!(ErrorCode::NotFound.code(), 5);
        assert_eq!(ErrorCode::Unauthenticated.code(), 16);

        for code in 0..=16 {
            let parsed = ErrorCode::from_code(code).expect("dense code range");
            assert_eq!(parsed.code(), code);
        }
        assert!(ErrorCode::from_code(17).is_none());
    }

    #[test]
    fn test_message_lookup_in_range() {
        assert_eq!(error_message(ErrorCode::Ok.code()), "");
        assert_eq!(
            error_message(ErrorCode::Cancelled.code()),
            "The operation was cancelled."
        );
        assert_eq!(
            error_message(ErrorCode::Unavailable.code()),
            "The service is currently unavailable."
        );
        assert_eq!(
            ErrorCode::PermissionDenied.message(),
            error_message(ErrorCode::PermissionDenied.code())
        );
    }

    #[test]
    fn test_message_lookup_out_of_range() {
        assert_eq!(error_message(-1), "");
        assert_eq!(error_message(i32::MIN), "");
        assert_eq!(error_message(17), "");
        assert_eq!(error_message(i32::MAX), "");
    }

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::from_error_code(ErrorCode::Unavailable);
        let display = format!("{}", err);
        assert!(display.contains("code 14"));
        assert!(display.contains("currently unavailable"));
    }

    #[test]
    fn test_operation_error_from_code() {
        let err: OperationError = ErrorCode::Aborted.into();
        assert_eq!(err.code, 10);
        assert_eq!(err.message, "The operation was aborted.");
    }
}
