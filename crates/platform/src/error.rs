//! Error types for Tether

use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Tether operations
#[derive(Debug, Error)]
pub enum TetherError {
    /// Socket-level failure (DNS, refusal, reset), propagated unchanged
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking step exceeded what was left of its budget
    #[error("{operation} timed out after {elapsed:?} (timeout {configured:?})")]
    Timeout {
        /// Step that was waiting when the budget ran out
        operation: String,
        /// Configured timeout for the whole sequence
        configured: Duration,
        /// Time spent when the timeout fired
        elapsed: Duration,
    },

    /// Malformed or rejecting proxy response
    #[error("{0}")]
    Proxy(String),

    /// Malformed or absent SSH identification string
    #[error("{0}")]
    Identification(String),

    /// Message dispatch failure
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Terminal authentication failure
    #[error("{0}")]
    Authentication(String),

    /// Server-initiated disconnect
    #[error("Server disconnected (reason {reason_code}): {description}")]
    Disconnected {
        /// SSH_DISCONNECT_* reason code
        reason_code: u32,
        /// Server supplied description
        description: String,
    },

    /// Malformed protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid argument passed to a constructor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TetherError {
    /// Returns true for [`TetherError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, TetherError::Timeout { .. })
    }
}

/// Message factory errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No message is registered for this number
    #[error("Message type {0} is not supported.")]
    NotSupported(u8),

    /// A message exists for this number but none is enabled right now
    #[error("Message type {0} is not valid in the current context.")]
    NotValidInContext(u8),

    /// No message is registered under this name
    #[error("Message '{0}' is not supported.")]
    UnknownName(String),

    /// Another message already answers for the number
    #[error("Cannot enable message '{requested}'. Message type {number} is already enabled for '{enabled}'.")]
    Conflict {
        /// Message that was being enabled
        requested: String,
        /// Shared wire number
        number: u8,
        /// Message currently enabled for the number
        enabled: String,
    },
}

/// Result type for Tether operations
pub type TetherResult<T> = Result<T, TetherError>;
