//! Tamper-evident access logging for shared health records.
//!
//! Every access to a tracked resource is written to an append-only ledger as a signed
//! memo; the resource keeps the list of ledger references. The audit trail is rebuilt
//! from the ledger alone, so the local store can lose or reorder nothing that matters:
//! at worst it can forget a reference, which shows up as a gap, not a forgery.
//!
//! - [`AccessRecorder`] writes one access and remembers its reference
//! - [`AccessLogReconstructor`] reads a resource's trail back from the ledger
//! - [`AccessMirror`] wires both from an [`AuditConfig`]

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
mod error;
mod mirror;
mod reconstructor;
mod recorder;
pub mod telemetry;

pub use crate::config::AuditConfig;
pub use error::{MirrorError, ReconstructError, RecordError, SettingsError};
pub use mirror::{AccessMirror, DispatchOutcome};
pub use reconstructor::{
    AccessLogReconstructor, AuditTrail, OmissionReason, OmittedReference, TrailOptions,
};
pub use recorder::AccessRecorder;
