//! Signing identity for ledger submissions.
//!
//! The identity is loaded exactly once at process start from an external secret
//! (a JSON array of 64 byte values: 32 secret bytes followed by the 32-byte public key)
//! and then shared read-only. Loading fails closed: a missing, malformed or unusable
//! secret is a fatal [`ConfigError`].

#![deny(unsafe_code)]

mod error;
mod identity;
mod loader;

pub use error::ConfigError;
pub use identity::{SigningIdentity, KEYPAIR_LEN};
pub use loader::{load_identity, parse_keypair_json, SecretSource};
