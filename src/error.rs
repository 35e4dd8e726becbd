//! Unified error handling for AotForge
//!
//! This module provides a centralized error type that consolidates all
//! domain-specific errors in the crate. Errors are categorized so callers
//! can decide whether to retry, fix their input, or report a bug:
//! - Resource errors (recoverable, retry after devices free up)
//! - User errors (bad input or configuration, actionable by callers)
//! - Programming errors (use-after-destroy, invalid transitions)
//! - Compiler errors (the external compiler rejected a model/shape)
//! - Internal errors (bugs, poisoned locks, I/O failures)

use std::fmt;

/// Unified error type for AotForge
///
/// Every failing operation in the crate returns this type. Model and
/// signature identifiers are carried in the variants so failures are
/// diagnosable without additional context.
#[derive(Debug, thiserror::Error)]
pub enum AotForgeError {
    // ========== Device Errors ==========
    /// Not enough free devices to satisfy a reservation
    #[error("insufficient devices: requested {requested}, {free} free")]
    InsufficientDevices { requested: usize, free: usize },

    /// Device id not present in the inventory
    #[error("device not found: {0}")]
    DeviceNotFound(u32),

    /// Global registry accessed before initialization
    #[error("device registry not initialized")]
    RegistryNotInitialized,

    // ========== Session Errors ==========
    /// Inputs do not match the session's bound shape signature
    #[error("shape mismatch for model {model}: bound signature {expected}, inputs {actual}")]
    ShapeMismatch {
        model: String,
        expected: String,
        actual: String,
    },

    /// Operation on a destroyed session
    #[error("session {0} is destroyed")]
    SessionDestroyed(u64),

    /// Operation not valid in the session's current state
    #[error("invalid session state transition: {operation} from {from}")]
    InvalidStateTransition { from: String, operation: String },

    // ========== Compiler Errors ==========
    /// The external compiler rejected the model/shape combination
    #[error("compilation failed for model {model} signature {signature}: {reason}")]
    CompilationFailure {
        model: String,
        signature: String,
        reason: String,
    },

    // ========== Configuration Errors ==========
    /// Invalid session or registry configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== I/O Errors ==========
    /// Cache directory or artifact I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Cache metadata serialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // ========== Internal Errors ==========
    /// Lock poisoned (indicates a panic while holding shared state)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    InternalError(String),
}

impl AotForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            AotForgeError::InsufficientDevices { .. } => ErrorCategory::Resource,

            AotForgeError::ShapeMismatch { .. } | AotForgeError::InvalidConfiguration(_) => {
                ErrorCategory::User
            }

            AotForgeError::SessionDestroyed(_)
            | AotForgeError::InvalidStateTransition { .. }
            | AotForgeError::RegistryNotInitialized => ErrorCategory::Programming,

            AotForgeError::CompilationFailure { .. } => ErrorCategory::Compiler,

            AotForgeError::DeviceNotFound(_)
            | AotForgeError::IoError(_)
            | AotForgeError::SerializationError(_)
            | AotForgeError::LockPoisoned(_)
            | AotForgeError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is recoverable by retrying later
    ///
    /// Only resource exhaustion is retryable: a reservation that failed
    /// with `InsufficientDevices` can succeed after another session
    /// detaches or is destroyed.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Resource
    }

    /// Check if this is a caller error (bad input or configuration)
    pub fn is_user_error(&self) -> bool {
        self.category() == ErrorCategory::User
    }

    /// Check if this is a programming error (API misuse)
    pub fn is_programming_error(&self) -> bool {
        self.category() == ErrorCategory::Programming
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource exhaustion - retry after devices free up
    Resource,
    /// User error - invalid input or configuration
    User,
    /// Programming error - API misuse, report as a bug in the caller
    Programming,
    /// Compiler error - the external compiler rejected the request
    Compiler,
    /// Internal error - indicates a bug in this crate
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Resource => write!(f, "Resource"),
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Programming => write!(f, "Programming"),
            ErrorCategory::Compiler => write!(f, "Compiler"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for AotForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AotForgeError::LockPoisoned(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type ForgeResult<T> = std::result::Result<T, AotForgeError>;
