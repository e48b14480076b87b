//! Error types for the bridge.
//!
//! This module defines error codes, the codec error raised while framing
//! messages, and the main error type returned by the façade.

use crate::value::BridgeValue;
use serde::{Deserialize, Serialize};

/// Error codes for categorizing bridge failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A message could not be encoded to the wire format
    EncodeError,
    /// A wire string could not be decoded into a message
    DecodeError,
    /// An inbound call named an unregistered handler
    NoHandler,
    /// A response arrived for an id with no pending entry
    StaleResponse,
    /// The script runtime has been torn down
    RuntimeUnavailable,
    /// A pending call was dropped by reset or teardown
    Abandoned,
    /// Invalid argument
    InvalidArgument,
    /// The script engine failed to start or evaluate
    EngineError,
    /// The script side reported a failed operation
    OperationFailed,
    /// Internal bridge error (bug)
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::EncodeError => write!(f, "ENCODE_ERROR"),
            ErrorCode::DecodeError => write!(f, "DECODE_ERROR"),
            ErrorCode::NoHandler => write!(f, "NO_HANDLER"),
            ErrorCode::StaleResponse => write!(f, "STALE_RESPONSE"),
            ErrorCode::RuntimeUnavailable => write!(f, "RUNTIME_UNAVAILABLE"),
            ErrorCode::Abandoned => write!(f, "ABANDONED"),
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::EngineError => write!(f, "ENGINE_ERROR"),
            ErrorCode::OperationFailed => write!(f, "OPERATION_FAILED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Failure while converting between messages and their wire/script forms
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Message could not be serialized
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Wire string could not be parsed
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// A script literal contained an escape sequence the bridge never emits
    #[error("invalid escape sequence at byte {position}")]
    InvalidEscape {
        /// Byte offset of the offending backslash
        position: usize,
    },
}

impl CodecError {
    /// The error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            CodecError::Encode(_) => ErrorCode::EncodeError,
            CodecError::Decode(_) | CodecError::InvalidEscape { .. } => ErrorCode::DecodeError,
        }
    }
}

/// Main error type for the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Framing error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Send attempted after teardown
    #[error("Script runtime is unavailable")]
    RuntimeUnavailable,

    /// A pending call was dropped before its response arrived
    #[error("Call {0} was abandoned before a response arrived")]
    Abandoned(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Script engine failure
    #[error("Script engine error: {0}")]
    Engine(String),

    /// The script side answered with a failed result envelope
    #[error("Script operation failed")]
    OperationFailed(Option<BridgeValue>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Map to the error code used in diagnostics and metrics
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Codec(e) => e.code(),
            BridgeError::Config(_) | BridgeError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            BridgeError::RuntimeUnavailable => ErrorCode::RuntimeUnavailable,
            BridgeError::Abandoned(_) => ErrorCode::Abandoned,
            BridgeError::Engine(_) => ErrorCode::EngineError,
            BridgeError::OperationFailed(_) => ErrorCode::OperationFailed,
            BridgeError::Io(_) => ErrorCode::InternalError,
        }
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(e: anyhow::Error) -> Self {
        BridgeError::Engine(format!("{:#}", e))
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
