//! Typed errors for store operations.
//!
//! Variants are `Clone` so a failure inside the drain loop can be broadcast
//! to every state subscriber.

use thiserror::Error;

/// Errors that can occur while building or driving a store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Malformed dispatch input
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A reducer returned no state, at a composition-time probe or at runtime
    #[error("reducer for slice \"{key}\": {detail}")]
    ReducerContract { key: String, detail: String },

    /// Store enhancer misuse at build time
    #[error("invalid enhancer: {0}")]
    InvalidEnhancer(String),

    /// The action channel has shut down
    #[error("store is closed")]
    Closed,
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
