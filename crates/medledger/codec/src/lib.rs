//! Access-event payload codec.
//!
//! ## Payload format (v1)
//!
//! A compact JSON object with a fixed field order:
//!
//! ```text
//! {"v":1,"id":"<uuid>","actor":"<actor>","action":"<label>","resource":"<resource>"}
//! ```
//!
//! JSON string escaping makes every field unambiguous, so actions like
//! `shared with jane@example.com` survive the round trip intact.
//!
//! Records written by the earlier comma-joined writer (`actor,resource,action`) are still
//! readable; see [`payload::decode_payload`].

#![deny(unsafe_code)]

mod error;
pub mod payload;
mod record;

pub use error::{CodecError, DecodeError};
pub use payload::{decode_payload, encode_payload, DecodedPayload, MAX_PAYLOAD_BYTES, PAYLOAD_VERSION};
pub use record::{InstructionData, MissingBlockTime, RawInstruction, RawRecord, RecordCodec};
