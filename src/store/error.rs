//! Store error types

use thiserror::Error;

/// Errors from the store connection and executor.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store-level lock could not be acquired within the bounded wait.
    #[error("store lock not acquired within {waited_ms} ms")]
    LockTimeout { waited_ms: u64 },

    /// A reconnect was requested inside the throttle window and refused.
    #[error("reconnect suppressed: last attempt {since_ms} ms ago, cooldown {cooldown_ms} ms")]
    ReconnectSuppressed { since_ms: u64, cooldown_ms: u64 },

    /// A raw statement failed the pre-execution validity check.
    #[error("statement rejected: {0}")]
    InvalidStatement(String),

    /// Driver-level failure (connect, prepare, execute).
    #[error("store driver error: {0}")]
    Driver(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
