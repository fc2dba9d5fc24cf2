//! Error types for the bridge.
//!
//! The taxonomy follows the boundary the error crosses:
//!
//! - contract violations (using a disposed value, dynamic-releasing a static
//!   name, converting to an incompatible tag) panic: they indicate a
//!   memory-safety risk, not a recoverable condition;
//! - expected absence (resolving a null or unknown native pointer, reading
//!   an empty name) is `Option`;
//! - failures reported by the engine come back as one of the enums below.

use thiserror::Error;
use vesper_ffi::{ApiVersion, CallStatus, RawCallError};

/// Top-level wrapper over every bridge error.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Errors installing the engine interface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstallError {
    #[error("engine interface {found:?} is not compatible with {required:?}")]
    IncompatibleVersion {
        found: ApiVersion,
        required: ApiVersion,
    },
    #[error("a bridge is already installed for this process")]
    AlreadyInstalled,
}

/// Errors in the managed/native object lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectError {
    #[error("cannot manually free instance of reference-counted class '{class}'")]
    FreeRefCounted { class: String },
    #[error("instance of class '{class}' is already disposing or disposed")]
    Disposed { class: String },
    #[error("engine failed to construct an instance of class '{class}'")]
    ConstructFailed { class: String },
}

/// Failure of a callable invocation or script-method dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("invalid method")]
    InvalidMethod,
    #[error("invalid argument at index {argument}")]
    InvalidArgument { argument: i32 },
    #[error("too many arguments")]
    TooManyArguments,
    #[error("too few arguments")]
    TooFewArguments,
    #[error("instance is null")]
    InstanceIsNull,
    #[error("required override '{method}' is not implemented")]
    MissingOverride { method: String },
    #[error("engine reported unknown call status {status}")]
    Unknown { status: u32 },
}

impl CallError {
    /// Maps an engine status code; `Ok` maps to `None`.
    pub fn from_status(raw: RawCallError) -> Option<CallError> {
        match CallStatus::try_from(raw.status) {
            Ok(CallStatus::Ok) => None,
            Ok(CallStatus::InvalidMethod) => Some(CallError::InvalidMethod),
            Ok(CallStatus::InvalidArgument) => Some(CallError::InvalidArgument {
                argument: raw.argument,
            }),
            Ok(CallStatus::TooManyArguments) => Some(CallError::TooManyArguments),
            Ok(CallStatus::TooFewArguments) => Some(CallError::TooFewArguments),
            Ok(CallStatus::InstanceIsNull) => Some(CallError::InstanceIsNull),
            Err(_) => Some(CallError::Unknown { status: raw.status }),
        }
    }
}

impl From<CallError> for RawCallError {
    fn from(err: CallError) -> RawCallError {
        let (status, argument) = match err {
            CallError::InvalidMethod | CallError::MissingOverride { .. } => {
                (CallStatus::InvalidMethod, -1)
            }
            CallError::InvalidArgument { argument } => (CallStatus::InvalidArgument, argument),
            CallError::TooManyArguments => (CallStatus::TooManyArguments, -1),
            CallError::TooFewArguments => (CallStatus::TooFewArguments, -1),
            CallError::InstanceIsNull => (CallStatus::InstanceIsNull, -1),
            CallError::Unknown { status } => {
                return RawCallError {
                    status,
                    argument: -1,
                };
            }
        };
        RawCallError {
            status: status.into(),
            argument,
        }
    }
}

/// Failure establishing a signal connection. Always fatal to the caller
/// that needed the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("cannot connect to signal '{signal}' (status {status})")]
    Rejected { signal: String, status: u32 },
}
