//! Error types for the queue crate.

use thiserror::Error;

/// Failures at the key-value store boundary.
///
/// These are infrastructure failures: the caller did nothing wrong, the
/// substrate did. They are kept separate from [`QueueError`]'s domain
/// conditions so the API layer can map them to 5xx instead of 4xx.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not reach the store (refused, dropped, timed out).
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("Store command error: {0}")]
    Backend(String),

    /// A multi-operation transaction failed to apply.
    #[error("Store transaction error: {0}")]
    Transaction(String),

    /// Stored data could not be decoded into a command or claim entry.
    #[error("Corrupt store data: {0}")]
    Corrupt(String),
}

/// Errors returned by the command queue engine.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The referenced command (or claim record) does not exist.
    #[error("Command not found")]
    NotFound,

    /// The presented claim token does not match, or the lease has expired.
    #[error("Invalid or expired claim")]
    InvalidClaim,

    /// The command has already been completed; its result is immutable.
    #[error("Command already completed")]
    AlreadyCompleted,

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
