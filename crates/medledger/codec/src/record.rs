use crate::error::{CodecError, DecodeError};
use crate::payload::{decode_payload, encode_payload};
use chrono::{DateTime, Utc};
use medledger_types::{AccessEvent, Address, LedgerReference};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instruction data as reported by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InstructionData {
    /// The ledger already parsed the memo into UTF-8 text.
    Text(String),
    /// Raw instruction bytes, base58 encoded.
    Base58(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstruction {
    pub program_id: String,
    pub data: InstructionData,
}

/// A confirmed transaction as fetched from the ledger, reduced to what decoding needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub reference: LedgerReference,
    pub slot: u64,
    /// Seconds since the Unix epoch, if the ledger recorded one.
    pub block_time: Option<i64>,
    /// The transaction landed but its execution failed.
    #[serde(default)]
    pub failed: bool,
    pub instructions: Vec<RawInstruction>,
}

/// What to do with a record that has no block time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingBlockTime {
    /// Fail decoding; the entry is left out of the trail.
    #[default]
    Omit,
    /// Best-effort ordering: stamp the record with the Unix epoch so it sorts last.
    UnixEpoch,
}

/// Encodes events for submission and decodes fetched records.
#[derive(Clone, Debug)]
pub struct RecordCodec {
    memo_program: Address,
    missing_block_time: MissingBlockTime,
}

impl RecordCodec {
    pub fn new(memo_program: Address) -> Self {
        Self {
            memo_program,
            missing_block_time: MissingBlockTime::Omit,
        }
    }

    pub fn with_missing_block_time(mut self, policy: MissingBlockTime) -> Self {
        self.missing_block_time = policy;
        self
    }

    pub fn memo_program(&self) -> Address {
        self.memo_program
    }

    pub fn encode(&self, event: &AccessEvent) -> Result<Vec<u8>, CodecError> {
        encode_payload(event)
    }

    /// Recover the access event, stamped with the ledger's block time.
    pub fn decode(&self, raw: &RawRecord) -> Result<AccessEvent, DecodeError> {
        if raw.failed {
            return Err(DecodeError::TransactionFailed);
        }

        let memo_program = self.memo_program.to_string();
        let instruction = raw
            .instructions
            .iter()
            .find(|ix| ix.program_id == memo_program)
            .ok_or_else(|| DecodeError::MissingInstruction(memo_program.clone()))?;

        let text = match &instruction.data {
            InstructionData::Text(text) => text.clone(),
            InstructionData::Base58(encoded) => {
                let bytes = bs58::decode(encoded)
                    .into_vec()
                    .map_err(|e| DecodeError::InvalidPayload(format!("bad base58 data: {e}")))?;
                String::from_utf8(bytes)
                    .map_err(|_| DecodeError::InvalidPayload("memo is not UTF-8".to_string()))?
            }
        };

        let confirmed_at = match raw.block_time {
            Some(secs) => {
                DateTime::<Utc>::from_timestamp(secs, 0).ok_or(DecodeError::InvalidBlockTime(secs))?
            }
            None => match self.missing_block_time {
                MissingBlockTime::Omit => return Err(DecodeError::MissingBlockTime),
                MissingBlockTime::UnixEpoch => DateTime::<Utc>::UNIX_EPOCH,
            },
        };

        let payload = decode_payload(&text)?;
        let event_id = payload
            .event_id
            .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, raw.reference.as_str().as_bytes()));

        Ok(AccessEvent::new(payload.actor, payload.action, payload.resource)
            .with_event_id(event_id)
            .confirmed(confirmed_at))
    }
}
