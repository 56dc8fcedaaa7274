//! Tamper-evident audit trail
//!
//! Every consent event and every attempted data access (success or failure)
//! produces one append-only record. Each record carries a SHA-256 digest of
//! its own content plus the digest of its predecessor, so the integrity
//! check can replay the chain and point at the first break instead of a
//! bare pass/fail. Records are never updated or deleted.

pub mod entry;
pub mod error;
pub mod query;
pub mod store;
pub mod trail;

pub use entry::*;
pub use error::*;
pub use query::*;
pub use store::*;
pub use trail::*;
