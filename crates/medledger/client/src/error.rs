use medledger_types::LedgerReference;
use std::time::Duration;
use thiserror::Error;

/// Submission did not produce a confirmed record. Nothing was persisted locally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("could not build transaction: {0}")]
    Signing(String),

    #[error("transaction rejected by the ledger: {0}")]
    Rejected(String),

    #[error("transaction {reference} not confirmed within {waited:?}")]
    ConfirmationTimeout {
        reference: LedgerReference,
        waited: Duration,
    },

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("ledger mirror is disabled")]
    Disabled,
}

/// A record could not be fetched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Unknown, not yet confirmed, or pruned; the ledger does not say which.
    #[error("no confirmed record for {0}")]
    NotFound(LedgerReference),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("ledger mirror is disabled")]
    Disabled,
}
