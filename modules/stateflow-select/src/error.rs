//! Typed errors for selector evaluation.

use thiserror::Error;

/// Errors that can occur while evaluating a memoized selector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectError {
    /// A pending keyed-memoization entry did not settle within the timeout
    /// window. The entry is evicted; the next identical call recomputes.
    #[error("selector computation for key \"{key}\" timed out")]
    Timeout { key: String },

    /// An input selector failed. Isolated per slot: siblings still settle.
    #[error("selector failed: {0}")]
    Failed(String),
}

/// Result type alias for selector operations.
pub type SelectResult<T> = std::result::Result<T, SelectError>;
