//! Tracked-resource storage.
//!
//! A tracked resource owns an append-only list of ledger references, one per recorded
//! access. Appends are atomic per resource; nothing is ever removed.
//!
//! Backends:
//! - [`InMemoryResourceStore`] for tests and throwaway runs
//! - [`JsonFileResourceStore`] for single-process deployments
//! - `PostgresResourceStore` behind the `postgres` feature

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod json_file;
mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StoreError, StoreResult};
pub use json_file::JsonFileResourceStore;
pub use memory::InMemoryResourceStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresResourceStore;
pub use traits::ResourceStore;
