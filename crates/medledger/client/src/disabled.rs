use crate::error::{FetchError, SubmissionError};
use crate::LedgerClient;
use async_trait::async_trait;
use medledger_codec::RawRecord;
use medledger_identity::SigningIdentity;
use medledger_types::LedgerReference;

/// Null-object client used when the audit mirror is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLedgerClient;

#[async_trait]
impl LedgerClient for DisabledLedgerClient {
    async fn submit(
        &self,
        _payload: &[u8],
        _identity: &SigningIdentity,
    ) -> Result<LedgerReference, SubmissionError> {
        Err(SubmissionError::Disabled)
    }

    async fn fetch(&self, _reference: &LedgerReference) -> Result<RawRecord, FetchError> {
        Err(FetchError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
