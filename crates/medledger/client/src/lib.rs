//! Ledger client for the medledger access-log mirror.
//!
//! [`LedgerClient`] is the seam between the audit core and the external ledger:
//!
//! - [`RpcLedgerClient`] talks JSON-RPC to a ledger node
//! - [`DisabledLedgerClient`] is the null object used when the mirror is switched off
//! - [`InMemoryLedger`] is a deterministic in-process ledger for tests and local runs
//!
//! None of the clients retry on their own; callers bound every call with a timeout.

#![deny(unsafe_code)]

mod disabled;
mod error;
mod memory;
mod rpc;
pub mod wire;

pub use disabled::DisabledLedgerClient;
pub use error::{FetchError, SubmissionError};
pub use memory::InMemoryLedger;
pub use rpc::{RpcClientConfig, RpcLedgerClient};

use async_trait::async_trait;
use medledger_codec::RawRecord;
use medledger_identity::SigningIdentity;
use medledger_types::LedgerReference;

/// Submit and look up access records on the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign and submit a single-memo transaction carrying `payload`, returning once the
    /// ledger reports it at the configured commitment level.
    async fn submit(
        &self,
        payload: &[u8],
        identity: &SigningIdentity,
    ) -> Result<LedgerReference, SubmissionError>;

    /// Fetch a previously confirmed record.
    async fn fetch(&self, reference: &LedgerReference) -> Result<RawRecord, FetchError>;

    /// `false` for the null-object client; callers short-circuit without any I/O.
    fn is_enabled(&self) -> bool {
        true
    }
}
