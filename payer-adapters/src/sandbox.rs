use crate::error::{AdapterError, AdapterResult};
use crate::models::{AdapterHealth, AdapterResponse, DateRange, RequestContext};
use crate::PayerAdapter;
use async_trait::async_trait;
use broker_common::{DataScope, HealthState};
use chrono::Utc;
use credential_vault::CredentialPayload;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-process adapter with canned responses.
///
/// Used for development wiring and tests: deterministic payloads, optional
/// per-scope failure injection, and a call counter so callers can assert
/// whether the network layer would have been touched.
pub struct SandboxAdapter {
    payer_code: String,
    capabilities: Vec<DataScope>,
    failures: Mutex<HashMap<DataScope, AdapterError>>,
    calls: AtomicU64,
    healthy: bool,
}

impl SandboxAdapter {
    pub fn new(payer_code: &str) -> Self {
        Self {
            payer_code: payer_code.to_string(),
            capabilities: DataScope::ALL.to_vec(),
            failures: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
            healthy: true,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<DataScope>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Make the next calls for `scope` fail with the given error.
    pub fn inject_failure(&self, scope: DataScope, error: AdapterError) {
        self.failures.lock().insert(scope, error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Number of data calls made so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(
        &self,
        ctx: &RequestContext,
        scope: DataScope,
        data: serde_json::Value,
    ) -> AdapterResult<AdapterResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.failures.lock().get(&scope) {
            return Err(err.clone());
        }

        let raw = json!({ "source": "sandbox", "scope": scope.as_str(), "data": data });
        Ok(AdapterResponse::ok(ctx.request_id, data, Some(raw), 1))
    }
}

#[async_trait]
impl PayerAdapter for SandboxAdapter {
    fn payer_code(&self) -> &str {
        &self.payer_code
    }

    fn supports_capability(&self, scope: DataScope) -> bool {
        self.capabilities.contains(&scope)
    }

    async fn authenticate(&self, _credential: &CredentialPayload) -> AdapterResult<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(AdapterError::ServiceUnavailable("sandbox is down".to_string()))
        }
    }

    async fn health_check(&self) -> AdapterResult<AdapterHealth> {
        if !self.healthy {
            return Err(AdapterError::ServiceUnavailable("sandbox is down".to_string()));
        }
        Ok(AdapterHealth {
            state: HealthState::Healthy,
            message: "sandbox".to_string(),
            latency_ms: 0,
            checked_at: Utc::now(),
        })
    }

    async fn check_eligibility(&self, ctx: &RequestContext) -> AdapterResult<AdapterResponse> {
        self.respond(
            ctx,
            DataScope::Eligibility,
            json!({
                "member_id": ctx.patient.member_id,
                "eligible": true,
                "plan_name": "Sandbox PPO",
                "coverage_active_since": "2024-01-01",
            }),
        )
    }

    async fn get_benefits(&self, ctx: &RequestContext) -> AdapterResult<AdapterResponse> {
        self.respond(
            ctx,
            DataScope::Benefits,
            json!({
                "member_id": ctx.patient.member_id,
                "deductible": 1500.0,
                "deductible_met": 420.0,
                "out_of_pocket_max": 6000.0,
                "copay_primary": 25.0,
                "copay_specialist": 50.0,
            }),
        )
    }

    async fn get_claims_history(
        &self,
        ctx: &RequestContext,
        date_range: Option<DateRange>,
    ) -> AdapterResult<AdapterResponse> {
        self.respond(
            ctx,
            DataScope::ClaimsHistory,
            json!({
                "member_id": ctx.patient.member_id,
                "range": date_range,
                "claims": [
                    { "claim_id": "SBX-1001", "status": "paid", "billed": 240.0 },
                    { "claim_id": "SBX-1002", "status": "denied", "billed": 90.0 },
                ],
            }),
        )
    }

    async fn check_prior_auth(
        &self,
        ctx: &RequestContext,
        service_code: &str,
    ) -> AdapterResult<AdapterResponse> {
        self.respond(
            ctx,
            DataScope::PriorAuth,
            json!({
                "member_id": ctx.patient.member_id,
                "service_code": service_code,
                "authorization_required": true,
                "status": "approved",
                "auth_number": "SBX-PA-77",
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiStyle, PatientIdentity, PayerIntegration};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn ctx() -> RequestContext {
        RequestContext::new(
            PatientIdentity {
                patient_id: Uuid::new_v4(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
                member_id: "M123".into(),
                group_number: None,
            },
            PayerIntegration {
                payer_code: "sandbox".into(),
                display_name: "Sandbox".into(),
                api_style: ApiStyle::Rest,
                supports_eligibility: true,
                supports_benefits: true,
                supports_claims_history: true,
                supports_prior_auth: true,
                health: HealthState::Healthy,
                health_checked_at: None,
            },
            CredentialPayload::ApiKey {
                api_key: "sandbox".into(),
                api_secret: None,
            },
        )
    }

    #[tokio::test]
    async fn eligibility_returns_envelope_and_counts_calls() {
        let adapter = SandboxAdapter::new("sandbox");
        let response = adapter.check_eligibility(&ctx()).await.unwrap();
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.raw_response.is_some());
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_typed() {
        let adapter = SandboxAdapter::new("sandbox");
        adapter.inject_failure(
            DataScope::Benefits,
            AdapterError::AuthFailed("expired key".into()),
        );

        let err = adapter.get_benefits(&ctx()).await.unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
        assert!(err.counts_against_credential());

        // Other scopes unaffected
        assert!(adapter.check_eligibility(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn unhealthy_sandbox_fails_health_check() {
        let adapter = SandboxAdapter::new("sandbox").unhealthy();
        let err = adapter.health_check().await.unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }
}
