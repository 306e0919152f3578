use medledger_client::SubmissionError;
use medledger_codec::CodecError;
use medledger_identity::ConfigError;
use medledger_store::StoreError;
use medledger_types::{LedgerReference, ResourceId};
use thiserror::Error;

/// Recording one access failed.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("resource {0} is not tracked")]
    UnknownResource(ResourceId),

    #[error("could not encode access event: {0}")]
    Encode(#[from] CodecError),

    #[error("ledger submission failed: {0}")]
    Submission(#[from] SubmissionError),

    /// The record is on the ledger but the resource does not list it.
    #[error("ledger record {reference} was written but could not be stored: {source}")]
    Persist {
        reference: LedgerReference,
        source: StoreError,
    },

    #[error("resource store error: {0}")]
    Store(StoreError),
}

impl RecordError {
    /// Reference of a ledger record that no resource points at, if any.
    pub fn orphaned_reference(&self) -> Option<&LedgerReference> {
        match self {
            Self::Persist { reference, .. } => Some(reference),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("resource {0} is not tracked")]
    UnknownResource(ResourceId),

    #[error("resource store error: {0}")]
    Store(StoreError),
}

/// Configuration file or environment could not be turned into an [`crate::AuditConfig`].
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The mirror could not be started. Always fatal at startup.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build ledger client: {0}")]
    Client(SubmissionError),
}
