//! Error types for the ledgerd service.

use thiserror::Error;

/// Main error type for ledgerd operations.
///
/// Admission and guard denials are ordinary variants so that callers can
/// match on the outcome kind instead of downcasting error objects.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limiter's bucket had no tokens for the request's key.
    /// Recoverable by retrying later; never a server fault.
    #[error("Rate limit exceeded by the {limiter} limiter")]
    AdmissionDenied {
        /// Name of the registry that denied the request
        limiter: String,
    },

    /// The repeated-failure guard's threshold was met for the initiating
    /// user. Mapped to the same "too many requests" status class as
    /// `AdmissionDenied`, but the cause is domain policy, not request rate.
    #[error("Limit of failed transfers per day ({threshold}) has been reached")]
    RepeatedFailureLimit {
        /// Failed-transfer count that triggers denial
        threshold: u32,
    },

    /// A referenced row does not exist in the ledger store.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of row looked up ("user", "account", ...)
        entity: &'static str,
        /// Identifier that missed
        id: i64,
    },

    /// SQLite errors from the ledger store
    #[error("Store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored timestamp could not be parsed back
    #[error("Invalid timestamp in store: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Whether this error is an admission-control denial (raw rate or
    /// repeated-failure policy) rather than a server fault.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            LedgerError::AdmissionDenied { .. } | LedgerError::RepeatedFailureLimit { .. }
        )
    }
}

/// Result type alias for ledgerd operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
