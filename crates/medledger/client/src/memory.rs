//! In-process ledger for tests and offline runs.

use crate::error::{FetchError, SubmissionError};
use crate::LedgerClient;
use async_trait::async_trait;
use medledger_codec::{InstructionData, RawInstruction, RawRecord};
use medledger_identity::SigningIdentity;
use medledger_types::{Address, LedgerReference};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// 2024-01-01T00:00:00Z
const DEFAULT_GENESIS_TIME: i64 = 1_704_067_200;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: RawRecord,
    confirmed: bool,
}

/// Deterministic ledger kept in memory.
///
/// Every submission lands in its own slot and gets `block_time = genesis + slot`, so
/// later submissions always carry strictly later timestamps. Failure, latency and
/// pending confirmation can be injected to exercise the callers' error paths.
#[derive(Debug)]
pub struct InMemoryLedger {
    memo_program: Address,
    records: RwLock<HashMap<LedgerReference, StoredRecord>>,
    genesis_time: i64,
    enabled: AtomicBool,
    next_slot: AtomicU64,
    auto_confirm: AtomicBool,
    failures_pending: AtomicUsize,
    latency_ms: AtomicU64,
    submit_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(Address::memo_program())
    }
}

impl InMemoryLedger {
    pub fn new(memo_program: Address) -> Self {
        Self {
            memo_program,
            records: RwLock::new(HashMap::new()),
            genesis_time: DEFAULT_GENESIS_TIME,
            enabled: AtomicBool::new(true),
            next_slot: AtomicU64::new(1),
            auto_confirm: AtomicBool::new(true),
            failures_pending: AtomicUsize::new(0),
            latency_ms: AtomicU64::new(0),
            submit_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Block time of slot 0, in Unix seconds.
    pub fn with_genesis_time(mut self, unix_seconds: i64) -> Self {
        self.genesis_time = unix_seconds;
        self
    }

    /// Report the ledger as switched off while still counting any calls that arrive.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// When off, new submissions stay unconfirmed until [`Self::confirm_pending`].
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.auto_confirm.store(enabled, Ordering::SeqCst);
    }

    /// Confirm every pending record. Returns how many were confirmed.
    pub async fn confirm_pending(&self) -> usize {
        let mut records = self.records.write().await;
        let mut confirmed = 0;
        for stored in records.values_mut().filter(|s| !s.confirmed) {
            stored.confirmed = true;
            confirmed += 1;
        }
        confirmed
    }

    /// Make the next `count` submissions fail with a transport error.
    pub fn fail_next_submits(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Delay applied before every submit and fetch.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Forget a record, as a pruning node would.
    pub async fn prune(&self, reference: &LedgerReference) -> bool {
        self.records.write().await.remove(reference).is_some()
    }

    /// Place an arbitrary confirmed record on the ledger.
    pub async fn insert_raw(&self, record: RawRecord) {
        self.records.write().await.insert(
            record.reference.clone(),
            StoredRecord {
                record,
                confirmed: true,
            },
        );
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn simulate_latency(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit(
        &self,
        payload: &[u8],
        identity: &SigningIdentity,
    ) -> Result<LedgerReference, SubmissionError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.take_injected_failure() {
            return Err(SubmissionError::Transport(
                "injected ledger failure".to_string(),
            ));
        }

        let slot = self.next_slot.fetch_add(1, Ordering::SeqCst);
        let mut signed = payload.to_vec();
        signed.extend_from_slice(&slot.to_le_bytes());
        let reference = LedgerReference::new(bs58::encode(identity.sign(&signed)).into_string());

        let data = match std::str::from_utf8(payload) {
            Ok(text) => InstructionData::Text(text.to_string()),
            Err(_) => InstructionData::Base58(bs58::encode(payload).into_string()),
        };
        let block_time = self
            .genesis_time
            .saturating_add(i64::try_from(slot).unwrap_or(i64::MAX));

        let record = RawRecord {
            reference: reference.clone(),
            slot,
            block_time: Some(block_time),
            failed: false,
            instructions: vec![RawInstruction {
                program_id: self.memo_program.to_string(),
                data,
            }],
        };
        let confirmed = self.auto_confirm.load(Ordering::SeqCst);
        self.records
            .write()
            .await
            .insert(reference.clone(), StoredRecord { record, confirmed });

        debug!(%reference, slot, confirmed, "in-memory ledger accepted record");
        Ok(reference)
    }

    async fn fetch(&self, reference: &LedgerReference) -> Result<RawRecord, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let records = self.records.read().await;
        match records.get(reference) {
            Some(stored) if stored.confirmed => Ok(stored.record.clone()),
            _ => Err(FetchError::NotFound(reference.clone())),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
