use thiserror::Error;

/// Errors raised while encoding an event for submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Why a fetched ledger record could not be turned back into an access event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record carries no instruction for memo program {0}")]
    MissingInstruction(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u64),

    #[error("record has no confirmed block time")]
    MissingBlockTime,

    #[error("block time {0} is out of range")]
    InvalidBlockTime(i64),

    #[error("transaction landed with an execution error")]
    TransactionFailed,
}
