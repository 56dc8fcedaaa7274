//! Payer Data Broker
//!
//! The central service: given an authorization and a requested data type it
//! enforces scope, resolves insurer to adapter to credentials, applies the
//! cache policy, invokes the adapter, persists the result, and emits an
//! audit entry. Fan-out operations run concurrently; a slow or failing
//! insurer never blocks the others.

pub mod broker;
pub mod cache;
pub mod directory;
pub mod error;
pub mod integrations;

pub use broker::*;
pub use cache::*;
pub use directory::*;
pub use error::*;
pub use integrations::*;
