//! Credential Vault for payer API secrets
//!
//! Stores one encrypted credential bundle per (practice, payer) pair and
//! tracks its lifecycle:
//! - AES-256-GCM authenticated encryption (separate ciphertext / IV / tag)
//! - Tagged-union credential payloads (OAuth client, API key, basic, cert)
//! - Usage and error counters with automatic deactivation after 5 errors
//! - Lazy deactivation on first read past `expires_at`
//! - Rotation as a plain overwrite with counters reset

pub mod encryption;
pub mod error;
pub mod key;
pub mod models;
pub mod store;
pub mod vault;

pub use encryption::*;
pub use error::*;
pub use key::*;
pub use models::*;
pub use store::*;
pub use vault::*;
