//! Payer adapter contract and registry
//!
//! Every insurer integration implements the same capability set:
//! authenticate, health check, and the four data operations. Each data
//! method resolves to a uniform response envelope or a typed error the
//! broker can branch on. The registry maps a payer code to its adapter
//! and resolves free-text insurance-provider names to payer codes.

pub mod error;
pub mod models;
pub mod registry;
pub mod rest;
pub mod sandbox;

pub use error::*;
pub use models::*;
pub use registry::*;
pub use rest::*;
pub use sandbox::*;

use async_trait::async_trait;
use broker_common::DataScope;
use credential_vault::CredentialPayload;

/// The contract every insurer integration satisfies.
///
/// A new payer is a drop-in implementation of this trait plus a registry
/// entry; the broker is insurer-agnostic.
#[async_trait]
pub trait PayerAdapter: Send + Sync {
    /// Payer code this adapter serves, e.g. `"acme_health"`.
    fn payer_code(&self) -> &str;

    /// Whether this adapter implements the given data operation.
    fn supports_capability(&self, scope: DataScope) -> bool;

    /// Verify credentials against the payer without fetching data.
    async fn authenticate(&self, credential: &CredentialPayload) -> AdapterResult<()>;

    /// Probe the payer API.
    async fn health_check(&self) -> AdapterResult<AdapterHealth>;

    /// Real-time coverage eligibility.
    async fn check_eligibility(&self, ctx: &RequestContext) -> AdapterResult<AdapterResponse>;

    /// Plan benefit details (deductible, copays, out-of-pocket).
    async fn get_benefits(&self, ctx: &RequestContext) -> AdapterResult<AdapterResponse>;

    /// Claims history, optionally bounded to a date range.
    async fn get_claims_history(
        &self,
        ctx: &RequestContext,
        date_range: Option<DateRange>,
    ) -> AdapterResult<AdapterResponse>;

    /// Prior-authorization status for a service code.
    async fn check_prior_auth(
        &self,
        ctx: &RequestContext,
        service_code: &str,
    ) -> AdapterResult<AdapterResponse>;
}
