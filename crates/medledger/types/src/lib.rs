//! Shared types for the medledger access-log mirror.
//!
//! A local access event ("file was downloaded") is anchored on an external ledger as a
//! signed memo. The ledger hands back a [`LedgerReference`], which is appended to the
//! owning [`TrackedResource`]. On the read side the references are resolved back into
//! [`AuditTrailEntry`] values.

#![deny(unsafe_code)]

mod action;
mod address;
mod commitment;
mod event;
mod ids;

pub use action::AccessAction;
pub use address::{Address, AddressError, MEMO_PROGRAM_ID};
pub use commitment::Commitment;
pub use event::{AccessEvent, AuditTrailEntry, TrackedResource};
pub use ids::{ActorId, LedgerReference, ResourceId};
