//! Consent and authorization workflow
//!
//! Issues single-use, scope-bound authorization tokens to patients, walks
//! the status state machine (pending, authorized, denied, expired, revoked),
//! rate-limits issuance per patient, delivers links through black-box
//! notification senders, and writes every event to the audit trail.
//!
//! `authorized` is the only state from which data may be fetched; all
//! transitions out of `pending` happen exactly once per token.

pub mod error;
pub mod models;
pub mod notify;
pub mod rate_limit;
pub mod store;
pub mod tokens;
pub mod workflow;

pub use error::*;
pub use models::*;
pub use notify::*;
pub use rate_limit::*;
pub use store::*;
pub use tokens::*;
pub use workflow::*;
