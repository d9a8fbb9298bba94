//! # Error Types
//!
//! Errors shared across the workspace. Engine errors are small `Copy` values
//! so dispatch code can compare them directly; codec errors carry the
//! underlying IO failure.

use thiserror::Error;

/// Result type for engine operations.
pub type SkvResult<T> = Result<T, SkvError>;

/// Errors raised by the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkvError {
    /// Key is missing or already expired.
    #[error("key not found")]
    NotFound,
    /// Stored value cannot be interpreted as a signed 64-bit integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    /// Arithmetic on a stored integer would overflow.
    #[error("increment or decrement would overflow")]
    Overflow,
}

/// Errors raised while encoding or parsing RESP2 frames.
#[derive(Debug, Error)]
pub enum RespError {
    /// Network or IO failure while reading a frame.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Framing violation.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
}
