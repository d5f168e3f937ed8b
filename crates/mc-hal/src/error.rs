//! Status codes and the error type shared by the multicast stack.
//!
//! Every mutating call returns an explicit status. Internally the status is
//! carried as [`McError`]; callers that need the numeric code use
//! [`McError::status`].

use std::fmt;
use thiserror::Error;

/// Numeric status codes exposed to the control plane.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McStatus {
    Success = 0,
    Failure = -1,
    InvalidHandle = -2,
    ResourceExhausted = -3,
    AlreadyExists = -4,
    AlreadyAssociated = -5,
    InUse = -6,
    FailedPrecondition = -7,
    IllegalState = -8,
    HardwareTimeout = -9,
    NotFound = -10,
    InvalidArgument = -11,
    HardwareError = -12,
}

impl McStatus {
    /// Creates a status from a raw i32 value. Unknown values map to `Failure`.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => McStatus::Success,
            -2 => McStatus::InvalidHandle,
            -3 => McStatus::ResourceExhausted,
            -4 => McStatus::AlreadyExists,
            -5 => McStatus::AlreadyAssociated,
            -6 => McStatus::InUse,
            -7 => McStatus::FailedPrecondition,
            -8 => McStatus::IllegalState,
            -9 => McStatus::HardwareTimeout,
            -10 => McStatus::NotFound,
            -11 => McStatus::InvalidArgument,
            -12 => McStatus::HardwareError,
            _ => McStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == McStatus::Success
    }

    pub fn is_error(&self) -> bool {
        *self != McStatus::Success
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> McResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(McError::from_status(self))
        }
    }
}

impl fmt::Display for McStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            McStatus::Success => "MC_STATUS_SUCCESS",
            McStatus::Failure => "MC_STATUS_FAILURE",
            McStatus::InvalidHandle => "MC_STATUS_INVALID_HANDLE",
            McStatus::ResourceExhausted => "MC_STATUS_RESOURCE_EXHAUSTED",
            McStatus::AlreadyExists => "MC_STATUS_ALREADY_EXISTS",
            McStatus::AlreadyAssociated => "MC_STATUS_ALREADY_ASSOCIATED",
            McStatus::InUse => "MC_STATUS_IN_USE",
            McStatus::FailedPrecondition => "MC_STATUS_FAILED_PRECONDITION",
            McStatus::IllegalState => "MC_STATUS_ILLEGAL_STATE",
            McStatus::HardwareTimeout => "MC_STATUS_HW_TIMEOUT",
            McStatus::NotFound => "MC_STATUS_NOT_FOUND",
            McStatus::InvalidArgument => "MC_STATUS_INVALID_ARGUMENT",
            McStatus::HardwareError => "MC_STATUS_HW_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Error type for multicast operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McError {
    /// Unknown, destroyed or wrong-device handle.
    #[error("Invalid handle: {handle}")]
    InvalidHandle { handle: String },

    /// Registry or replication memory is full.
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    /// Duplicate key, such as a group id already in use.
    #[error("Already exists: {item}")]
    AlreadyExists { item: String },

    /// Membership exclusivity would be violated.
    #[error("Already associated: {item}")]
    AlreadyAssociated { item: String },

    /// Destroy attempted while associations remain.
    #[error("Object in use: {object}")]
    InUse { object: String },

    /// The object is not in the state the operation requires.
    #[error("Failed precondition: {message}")]
    FailedPrecondition { message: String },

    /// Session or batch state mismatch.
    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    /// Hardware never acknowledged a write. Fatal, never retried.
    #[error("Hardware timeout: {operation}")]
    HardwareTimeout { operation: String },

    /// Iteration ran past the last entry, or a lookup missed.
    #[error("Not found: {item}")]
    NotFound { item: String },

    /// Out of range or malformed argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The hardware collaborator rejected a commit.
    #[error("Hardware error: {message}")]
    Hardware { message: String },
}

impl McError {
    /// Creates an error from a status code.
    pub fn from_status(status: McStatus) -> Self {
        let what = format!("status {}", status);
        match status {
            McStatus::Success | McStatus::Failure | McStatus::HardwareError => {
                McError::Hardware { message: what }
            }
            McStatus::InvalidHandle => McError::InvalidHandle { handle: what },
            McStatus::ResourceExhausted => McError::ResourceExhausted { resource: what },
            McStatus::AlreadyExists => McError::AlreadyExists { item: what },
            McStatus::AlreadyAssociated => McError::AlreadyAssociated { item: what },
            McStatus::InUse => McError::InUse { object: what },
            McStatus::FailedPrecondition => McError::FailedPrecondition { message: what },
            McStatus::IllegalState => McError::IllegalState { message: what },
            McStatus::HardwareTimeout => McError::HardwareTimeout { operation: what },
            McStatus::NotFound => McError::NotFound { item: what },
            McStatus::InvalidArgument => McError::InvalidArgument { message: what },
        }
    }

    pub fn invalid_handle(handle: impl fmt::Display) -> Self {
        McError::InvalidHandle {
            handle: handle.to_string(),
        }
    }

    pub fn resource_exhausted(resource: impl Into<String>) -> Self {
        McError::ResourceExhausted {
            resource: resource.into(),
        }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        McError::AlreadyExists { item: item.into() }
    }

    pub fn already_associated(item: impl Into<String>) -> Self {
        McError::AlreadyAssociated { item: item.into() }
    }

    pub fn in_use(object: impl Into<String>) -> Self {
        McError::InUse {
            object: object.into(),
        }
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        McError::FailedPrecondition {
            message: message.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        McError::IllegalState {
            message: message.into(),
        }
    }

    pub fn hardware_timeout(operation: impl Into<String>) -> Self {
        McError::HardwareTimeout {
            operation: operation.into(),
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        McError::NotFound { item: item.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        McError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn hardware(message: impl Into<String>) -> Self {
        McError::Hardware {
            message: message.into(),
        }
    }

    /// Returns the numeric status for this error.
    pub fn status(&self) -> McStatus {
        match self {
            McError::InvalidHandle { .. } => McStatus::InvalidHandle,
            McError::ResourceExhausted { .. } => McStatus::ResourceExhausted,
            McError::AlreadyExists { .. } => McStatus::AlreadyExists,
            McError::AlreadyAssociated { .. } => McStatus::AlreadyAssociated,
            McError::InUse { .. } => McStatus::InUse,
            McError::FailedPrecondition { .. } => McStatus::FailedPrecondition,
            McError::IllegalState { .. } => McStatus::IllegalState,
            McError::HardwareTimeout { .. } => McStatus::HardwareTimeout,
            McError::NotFound { .. } => McStatus::NotFound,
            McError::InvalidArgument { .. } => McStatus::InvalidArgument,
            McError::Hardware { .. } => McStatus::HardwareError,
        }
    }

    /// Returns true for failures that happen after shadow state was already
    /// mutated. These are surfaced upward and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            McError::HardwareTimeout { .. } | McError::Hardware { .. }
        )
    }
}

/// Result type for multicast operations.
pub type McResult<T> = Result<T, McError>;

/// Extension trait for converting raw status codes.
pub trait McStatusExt {
    fn to_result(self) -> McResult<()>;
}

impl McStatusExt for i32 {
    fn to_result(self) -> McResult<()> {
        McStatus::from_raw(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success() {
        assert!(McStatus::Success.is_success());
        assert!(!McStatus::Success.is_error());
        assert!(McStatus::Success.into_result().is_ok());
    }

    #[test]
    fn test_status_from_raw() {
        assert_eq!(McStatus::from_raw(0), McStatus::Success);
        assert_eq!(McStatus::from_raw(-8), McStatus::IllegalState);
        assert_eq!(McStatus::from_raw(-999), McStatus::Failure);
    }

    #[test]
    fn test_error_status_round_trip() {
        for status in [
            McStatus::InvalidHandle,
            McStatus::ResourceExhausted,
            McStatus::AlreadyExists,
            McStatus::AlreadyAssociated,
            McStatus::InUse,
            McStatus::IllegalState,
            McStatus::HardwareTimeout,
            McStatus::NotFound,
        ] {
            assert_eq!(McError::from_status(status).status(), status);
        }
    }

    #[test]
    fn test_raw_status_to_result() {
        assert!(0_i32.to_result().is_ok());
        assert!(matches!(
            (-3_i32).to_result(),
            Err(McError::ResourceExhausted { .. })
        ));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(McError::hardware_timeout("end_batch").is_fatal());
        assert!(McError::hardware("dma").is_fatal());
        assert!(!McError::in_use("node").is_fatal());
    }

    #[test]
    fn test_display() {
        assert_eq!(McStatus::InUse.to_string(), "MC_STATUS_IN_USE");
        assert_eq!(
            McError::illegal_state("batch already open").to_string(),
            "Illegal state: batch already open"
        );
    }
}
