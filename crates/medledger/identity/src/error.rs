use thiserror::Error;

/// Why a signing identity could not be loaded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("signing key missing: {source_name} is not set; provide a JSON array of 64 byte values or disable the audit mirror")]
    Missing { source_name: String },

    #[error("signing key in {source_name} is malformed: {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("signing key in {source_name} was rejected: {reason}; the last 32 bytes must be the public key of the first 32")]
    Unusable { source_name: String, reason: String },
}

impl ConfigError {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    pub fn is_unusable(&self) -> bool {
        matches!(self, Self::Unusable { .. })
    }
}
