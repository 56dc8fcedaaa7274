use crate::cache::{CacheEntry, CacheRepository, CacheStatus, DEFAULT_CACHE_TTL_HOURS};
use crate::directory::PatientDirectory;
use crate::error::{BrokerError, BrokerResult};
use crate::integrations::IntegrationRepository;
use audit_trail::{AuditEvent, AuditTrail, EventCategory};
use broker_common::{ActorType, DataScope, HealthState};
use chrono::{DateTime, Duration, Utc};
use consent_service::{AuthorizationRepository, AuthorizationStatus, PatientAuthorization};
use credential_vault::CredentialVault;
use futures::future::join_all;
use payer_adapters::{
    AdapterRegistry, DateRange, PayerAdapter, RequestContext,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-call knobs for `fetch_insurance_data`.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Skip the cache and hit the payer even for a fresh entry.
    pub force_refresh: bool,
    /// Cache lifetime for the written entry; default 24h.
    pub cache_ttl_hours: Option<i64>,
    /// Service code for prior-authorization checks.
    pub service_code: Option<String>,
    /// Date bounds for claims-history queries.
    pub date_range: Option<DateRange>,
}

/// Who is asking, for audit attribution.
#[derive(Debug, Clone)]
pub struct RequestActor {
    pub actor_type: ActorType,
    pub actor_id: String,
}

impl RequestActor {
    pub fn user(actor_id: &str) -> Self {
        Self {
            actor_type: ActorType::User,
            actor_id: actor_id.to_string(),
        }
    }

    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: "broker".to_string(),
        }
    }
}

/// Successful fetch result handed back to callers.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub scope: DataScope,
    pub payer_code: String,
    /// True when served from cache with no adapter invocation.
    pub cached: bool,
    pub data: Option<serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One payer's health-sweep result.
#[derive(Debug, Clone, Serialize)]
pub struct PayerHealthReport {
    pub payer_code: String,
    pub state: HealthState,
    pub message: String,
    pub latency_ms: u64,
}

/// The orchestrator: consent gate, insurer resolution, cache policy,
/// adapter dispatch, persistence, and audit, in that order.
pub struct PayerDataBroker {
    registry: Arc<AdapterRegistry>,
    vault: Arc<CredentialVault>,
    cache: Arc<dyn CacheRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    directory: Arc<dyn PatientDirectory>,
    authorizations: Arc<dyn AuthorizationRepository>,
    audit: Arc<AuditTrail>,
}

impl PayerDataBroker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<AdapterRegistry>,
        vault: Arc<CredentialVault>,
        cache: Arc<dyn CacheRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        directory: Arc<dyn PatientDirectory>,
        authorizations: Arc<dyn AuthorizationRepository>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            registry,
            vault,
            cache,
            integrations,
            directory,
            authorizations,
            audit,
        }
    }

    /// Fetch one data type for one consent grant.
    ///
    /// Scope is enforced before anything else is resolved: a data type the
    /// grant does not cover is rejected even when the adapter could serve it
    /// and credentials are valid.
    pub async fn fetch_insurance_data(
        &self,
        authorization: &PatientAuthorization,
        scope: DataScope,
        options: &FetchOptions,
        actor: &RequestActor,
    ) -> BrokerResult<FetchOutcome> {
        match self
            .fetch_inner(authorization, scope, options, actor)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.audit_failure(authorization, scope, actor, &err).await?;
                Err(err)
            }
        }
    }

    async fn fetch_inner(
        &self,
        authorization: &PatientAuthorization,
        scope: DataScope,
        options: &FetchOptions,
        actor: &RequestActor,
    ) -> BrokerResult<FetchOutcome> {
        let now = Utc::now();

        // 1. Only `authorized` grants may fetch; a lapsed grant is inactive
        if authorization.status != AuthorizationStatus::Authorized
            || authorization.expires_at <= now
        {
            return Err(BrokerError::AuthorizationNotActive);
        }

        // 2. Scope gate, independent of adapter capability
        if !authorization.scope_authorized(scope) {
            return Err(BrokerError::ScopeNotAuthorized(scope));
        }

        // 3. Resolve patient and practice
        let patient = self
            .directory
            .get_patient(authorization.patient_id)
            .await?
            .ok_or(BrokerError::PatientNotFound)?;
        self.directory
            .get_practice(authorization.practice_id)
            .await?
            .ok_or(BrokerError::PracticeNotFound)?;

        // 4. Cache policy
        if !options.force_refresh {
            if let Some(entry) = self.cache.get(patient.patient_id, scope).await? {
                if entry.is_fresh(now) {
                    self.audit_access(authorization, scope, actor, &entry.payer_code, true)
                        .await?;
                    return Ok(FetchOutcome {
                        scope,
                        payer_code: entry.payer_code.clone(),
                        cached: true,
                        data: entry.normalized_data.clone(),
                        fetched_at: entry.fetched_at,
                        expires_at: entry.expires_at,
                    });
                }
            }
        }

        // 5. Free-text provider name to payer code
        let payer_code = self
            .registry
            .resolve_payer_code(&patient.insurance_provider_name)
            .ok_or_else(|| {
                BrokerError::UnsupportedProvider(patient.insurance_provider_name.clone())
            })?;

        // 6. Adapter and capability
        let adapter = self
            .registry
            .get_adapter(&payer_code)
            .ok_or_else(|| BrokerError::UnsupportedProvider(payer_code.clone()))?;
        if !adapter.supports_capability(scope) {
            return Err(BrokerError::CapabilityNotSupported {
                payer_code: payer_code.clone(),
                scope,
            });
        }

        // 7. Integration configuration row
        let integration = self
            .integrations
            .get(&payer_code)
            .await?
            .ok_or_else(|| BrokerError::IntegrationNotConfigured(payer_code.clone()))?;

        // 8. Credentials
        let credential = self
            .vault
            .get_credentials(authorization.practice_id, &payer_code)
            .await?
            .ok_or_else(|| BrokerError::NoValidCredentials(payer_code.clone()))?;

        // 9. Dispatch
        let ctx = RequestContext::new(patient.identity(), integration, credential.payload);
        let result = self.dispatch(adapter.as_ref(), &ctx, scope, options).await;

        let ttl = Duration::hours(
            options
                .cache_ttl_hours
                .unwrap_or(DEFAULT_CACHE_TTL_HOURS),
        );

        match result {
            // 10. Success: count usage, overwrite cache, audit
            Ok(response) => {
                self.vault
                    .record_usage(authorization.practice_id, &payer_code)
                    .await?;

                let entry = CacheEntry {
                    patient_id: patient.patient_id,
                    scope,
                    payer_code: payer_code.clone(),
                    status: CacheStatus::Success,
                    normalized_data: response.data.clone(),
                    raw_response: response.raw_response,
                    error_code: None,
                    error_message: None,
                    fetched_at: now,
                    expires_at: now + ttl,
                    is_stale: false,
                };
                self.cache.upsert(entry.clone()).await?;

                self.audit_access(authorization, scope, actor, &payer_code, false)
                    .await?;

                info!(
                    patient_id = %patient.patient_id,
                    payer_code = %payer_code,
                    scope = %scope,
                    response_time_ms = response.response_time_ms,
                    "payer data fetched"
                );
                Ok(FetchOutcome {
                    scope,
                    payer_code,
                    cached: false,
                    data: entry.normalized_data,
                    fetched_at: entry.fetched_at,
                    expires_at: entry.expires_at,
                })
            }
            // 11. Adapter failure: count AUTH_FAILED against the credential,
            // record the failure as latest-known-state, audit
            Err(adapter_err) => {
                if adapter_err.counts_against_credential() {
                    self.vault
                        .record_error(
                            authorization.practice_id,
                            &payer_code,
                            &adapter_err.to_string(),
                        )
                        .await?;
                }

                let entry = CacheEntry {
                    patient_id: patient.patient_id,
                    scope,
                    payer_code: payer_code.clone(),
                    status: CacheStatus::Error,
                    normalized_data: None,
                    raw_response: None,
                    error_code: Some(adapter_err.code().to_string()),
                    error_message: Some(adapter_err.to_string()),
                    fetched_at: now,
                    expires_at: now + ttl,
                    is_stale: false,
                };
                self.cache.upsert(entry).await?;

                warn!(
                    patient_id = %patient.patient_id,
                    payer_code = %payer_code,
                    scope = %scope,
                    error_code = adapter_err.code(),
                    "payer data fetch failed"
                );
                Err(BrokerError::Adapter(adapter_err))
            }
        }
    }

    async fn dispatch(
        &self,
        adapter: &dyn PayerAdapter,
        ctx: &RequestContext,
        scope: DataScope,
        options: &FetchOptions,
    ) -> Result<payer_adapters::AdapterResponse, payer_adapters::AdapterError> {
        match scope {
            DataScope::Eligibility => adapter.check_eligibility(ctx).await,
            DataScope::Benefits => adapter.get_benefits(ctx).await,
            DataScope::ClaimsHistory => {
                adapter.get_claims_history(ctx, options.date_range).await
            }
            DataScope::PriorAuth => {
                adapter
                    .check_prior_auth(ctx, options.service_code.as_deref().unwrap_or(""))
                    .await
            }
        }
    }

    /// Fetch every scope the grant covers, concurrently. Partial failure is
    /// expected and reported per data type, never as a whole-call failure.
    pub async fn fetch_all_authorized_data(
        &self,
        authorization: &PatientAuthorization,
        options: &FetchOptions,
        actor: &RequestActor,
    ) -> HashMap<DataScope, BrokerResult<FetchOutcome>> {
        let fetches = authorization.scopes.iter().map(|scope| async move {
            (
                *scope,
                self.fetch_insurance_data(authorization, *scope, options, actor)
                    .await,
            )
        });
        join_all(fetches).await.into_iter().collect()
    }

    /// Force-refresh every scope of every `authorized` grant for a patient.
    /// Idempotent; safe to run concurrently with itself.
    pub async fn refresh_stale_data(&self, patient_id: Uuid) -> BrokerResult<u64> {
        let grants = self
            .authorizations
            .list_for_patient(patient_id, Some(AuthorizationStatus::Authorized))
            .await?;

        let options = FetchOptions {
            force_refresh: true,
            ..FetchOptions::default()
        };
        let actor = RequestActor::system();

        let mut refreshed = 0;
        for grant in &grants {
            let results = self
                .fetch_all_authorized_data(grant, &options, &actor)
                .await;
            refreshed += results.values().filter(|r| r.is_ok()).count() as u64;
        }

        info!(patient_id = %patient_id, refreshed, "stale data refresh sweep finished");
        Ok(refreshed)
    }

    /// Latest-known state for a patient without touching the network.
    pub async fn get_cached_data_for_patient(
        &self,
        patient_id: Uuid,
        scopes: Option<&[DataScope]>,
    ) -> BrokerResult<Vec<CacheEntry>> {
        let entries = self.cache.list_for_patient(patient_id).await?;
        Ok(match scopes {
            Some(wanted) => entries
                .into_iter()
                .filter(|e| wanted.contains(&e.scope))
                .collect(),
            None => entries,
        })
    }

    /// Probe every registered adapter concurrently and persist the observed
    /// state onto its integration row. Adapter panics are out of scope here;
    /// typed errors map to `down`.
    pub async fn check_all_payer_health(&self) -> BrokerResult<Vec<PayerHealthReport>> {
        let codes = self.registry.available_payers();
        let probes = codes.iter().filter_map(|code| {
            self.registry.get_adapter(code).map(|adapter| async move {
                let report = match adapter.health_check().await {
                    Ok(health) => PayerHealthReport {
                        payer_code: adapter.payer_code().to_string(),
                        state: health.state,
                        message: health.message,
                        latency_ms: health.latency_ms,
                    },
                    Err(err) => PayerHealthReport {
                        payer_code: adapter.payer_code().to_string(),
                        state: HealthState::Down,
                        message: err.to_string(),
                        latency_ms: 0,
                    },
                };
                report
            })
        });

        let reports = join_all(probes).await;
        let now = Utc::now();
        for report in &reports {
            self.integrations
                .set_health(&report.payer_code, report.state, now)
                .await?;
            if report.state != HealthState::Healthy {
                warn!(
                    payer_code = %report.payer_code,
                    state = report.state.as_str(),
                    message = %report.message,
                    "payer health degraded"
                );
            }
        }
        Ok(reports)
    }

    async fn audit_access(
        &self,
        authorization: &PatientAuthorization,
        scope: DataScope,
        actor: &RequestActor,
        payer_code: &str,
        cached: bool,
    ) -> BrokerResult<()> {
        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::DataAccess,
                    "data_accessed",
                    "insurance_data",
                    &authorization.patient_id.to_string(),
                )
                .actor(actor.actor_type, &actor.actor_id)
                .practice(authorization.practice_id)
                .patient(authorization.patient_id)
                .details(serde_json::json!({
                    "authorization_id": authorization.id,
                    "scope": scope,
                    "payer_code": payer_code,
                    "cached": cached,
                }))
                .outcome(true),
            )
            .await?;
        Ok(())
    }

    async fn audit_failure(
        &self,
        authorization: &PatientAuthorization,
        scope: DataScope,
        actor: &RequestActor,
        err: &BrokerError,
    ) -> BrokerResult<()> {
        self.audit
            .record(
                AuditEvent::new(
                    EventCategory::DataAccess,
                    "data_accessed",
                    "insurance_data",
                    &authorization.patient_id.to_string(),
                )
                .actor(actor.actor_type, &actor.actor_id)
                .practice(authorization.practice_id)
                .patient(authorization.patient_id)
                .details(serde_json::json!({
                    "authorization_id": authorization.id,
                    "scope": scope,
                    "error_code": err.code(),
                    "error": err.to_string(),
                }))
                .outcome(false),
            )
            .await?;
        Ok(())
    }
}
