use audit_trail::{AuditQuery, AuditTrail, EventCategory, InMemoryAuditStore};
use broker_common::{DataScope, HealthState};
use chrono::{Duration, NaiveDate, Utc};
use consent_service::{
    AuthorizationRepository, AuthorizationStatus, ClientInfo, ConsentDecision, ConsentService,
    CreateAuthorizationRequest, DeliveryMethod, InMemoryAuthorizationRepository, LoggingSender,
    PatientAuthorization,
};
use credential_vault::{
    CredentialPayload, CredentialVault, InMemoryCredentialRepository, MasterKey,
};
use payer_adapters::{
    AdapterError, AdapterRegistry, ApiStyle, PayerAdapter, PayerIntegration, SandboxAdapter,
};
use payer_broker::{
    BrokerCacheInvalidator, BrokerError, CacheRepository, CacheStatus, FetchOptions,
    InMemoryCacheRepository, InMemoryDirectory, InMemoryIntegrationRepository,
    IntegrationRepository, PatientProfile, PayerDataBroker, PracticeProfile, RequestActor,
};
use std::sync::Arc;
use uuid::Uuid;

const TEST_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

struct Harness {
    broker: PayerDataBroker,
    sandbox: Arc<SandboxAdapter>,
    vault: Arc<CredentialVault>,
    cache: Arc<InMemoryCacheRepository>,
    audit: Arc<AuditTrail>,
    authorizations: Arc<InMemoryAuthorizationRepository>,
    integrations: Arc<InMemoryIntegrationRepository>,
    practice_id: Uuid,
    patient_id: Uuid,
}

fn sandbox_integration(payer_code: &str) -> PayerIntegration {
    PayerIntegration {
        payer_code: payer_code.to_string(),
        display_name: "Sandbox Health Plan".to_string(),
        api_style: ApiStyle::Rest,
        supports_eligibility: true,
        supports_benefits: true,
        supports_claims_history: true,
        supports_prior_auth: true,
        health: HealthState::Healthy,
        health_checked_at: None,
    }
}

async fn harness_with_adapter(sandbox: SandboxAdapter) -> Harness {
    let sandbox = Arc::new(sandbox);

    let mut registry = AdapterRegistry::new();
    registry.register(sandbox.clone());
    let registry = Arc::new(registry);

    let key = MasterKey::from_hex(TEST_KEY_HEX).unwrap();
    let vault = Arc::new(
        CredentialVault::new(&key, Arc::new(InMemoryCredentialRepository::new())).unwrap(),
    );

    let cache = Arc::new(InMemoryCacheRepository::new());
    let integrations = Arc::new(InMemoryIntegrationRepository::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let authorizations = Arc::new(InMemoryAuthorizationRepository::new());
    let audit = Arc::new(
        AuditTrail::new(Arc::new(InMemoryAuditStore::new()))
            .await
            .unwrap(),
    );

    let practice_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    directory.add_practice(PracticeProfile {
        practice_id,
        name: "Lakeside Family Medicine".to_string(),
    });
    directory.add_patient(PatientProfile {
        patient_id,
        practice_id,
        first_name: "Ana".to_string(),
        last_name: "Moreno".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1988, 4, 12).unwrap(),
        member_id: "MBR-22819".to_string(),
        group_number: Some("GRP-114".to_string()),
        insurance_provider_name: "Sandbox Health Plan".to_string(),
    });

    integrations
        .upsert(sandbox_integration(sandbox.payer_code()))
        .await
        .unwrap();

    vault
        .store_credentials(
            practice_id,
            sandbox.payer_code(),
            &CredentialPayload::ApiKey {
                api_key: "sk_test_1".to_string(),
                api_secret: None,
            },
            None,
        )
        .await
        .unwrap();

    let broker = PayerDataBroker::new(
        registry,
        vault.clone(),
        cache.clone(),
        integrations.clone(),
        directory,
        authorizations.clone(),
        audit.clone(),
    );

    Harness {
        broker,
        sandbox,
        vault,
        cache,
        audit,
        authorizations,
        integrations,
        practice_id,
        patient_id,
    }
}

async fn harness() -> Harness {
    harness_with_adapter(SandboxAdapter::new("sandbox")).await
}

fn authorized_grant(h: &Harness, scopes: Vec<DataScope>) -> PatientAuthorization {
    let now = Utc::now();
    PatientAuthorization {
        id: Uuid::new_v4(),
        practice_id: h.practice_id,
        patient_id: h.patient_id,
        scopes,
        status: AuthorizationStatus::Authorized,
        token: "consumed".to_string(),
        token_expires_at: now,
        token_used_at: Some(now),
        expires_at: now + Duration::days(300),
        delivery_method: DeliveryMethod::Email,
        delivery_recipient: "ana@example.com".to_string(),
        notification_sent: true,
        consent_given_at: Some(now),
        consent_signature: Some("Ana Moreno".to_string()),
        consent_ip_address: None,
        consent_user_agent: None,
        revoked_at: None,
        revoked_reason: None,
        resend_count: 0,
        link_attempt_count: 1,
        created_at: now,
        updated_at: now,
    }
}

fn actor() -> RequestActor {
    RequestActor::user("dr-chen")
}

#[tokio::test]
async fn scope_rejection_wins_over_adapter_capability() {
    // The adapter cannot serve claims either, but the grant gate must fire
    // first and the payer must never be contacted.
    let h = harness_with_adapter(
        SandboxAdapter::new("sandbox").with_capabilities(vec![DataScope::Eligibility]),
    )
    .await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility]);

    let err = h
        .broker
        .fetch_insurance_data(
            &grant,
            DataScope::ClaimsHistory,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BrokerError::ScopeNotAuthorized(DataScope::ClaimsHistory)
    ));
    assert_eq!(h.sandbox.call_count(), 0);
}

#[tokio::test]
async fn capability_rejection_when_scope_is_granted() {
    let h = harness_with_adapter(
        SandboxAdapter::new("sandbox").with_capabilities(vec![DataScope::Eligibility]),
    )
    .await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility, DataScope::PriorAuth]);

    let err = h
        .broker
        .fetch_insurance_data(
            &grant,
            DataScope::PriorAuth,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::CapabilityNotSupported { .. }));
    assert_eq!(h.sandbox.call_count(), 0);
}

#[tokio::test]
async fn fresh_cache_is_served_without_touching_the_payer() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility]);
    let options = FetchOptions::default();

    let first = h
        .broker
        .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
        .await
        .unwrap();
    assert!(!first.cached);
    assert!(first.data.is_some());
    assert_eq!(h.sandbox.call_count(), 1);

    let second = h
        .broker
        .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(second.data, first.data);
    assert_eq!(h.sandbox.call_count(), 1);

    // Both reads are disclosures and both land in the audit trail.
    let accesses = h
        .audit
        .query(
            &AuditQuery::new()
                .category(EventCategory::DataAccess)
                .event_type("data_accessed"),
        )
        .await
        .unwrap();
    assert_eq!(accesses.len(), 2);
    assert!(accesses.iter().all(|r| r.success));
}

#[tokio::test]
async fn force_refresh_bypasses_a_fresh_entry() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Benefits]);

    h.broker
        .fetch_insurance_data(&grant, DataScope::Benefits, &FetchOptions::default(), &actor())
        .await
        .unwrap();
    assert_eq!(h.sandbox.call_count(), 1);

    let refreshed = h
        .broker
        .fetch_insurance_data(
            &grant,
            DataScope::Benefits,
            &FetchOptions {
                force_refresh: true,
                ..FetchOptions::default()
            },
            &actor(),
        )
        .await
        .unwrap();
    assert!(!refreshed.cached);
    assert_eq!(h.sandbox.call_count(), 2);
}

#[tokio::test]
async fn error_entries_are_recorded_but_never_served() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility]);
    let options = FetchOptions::default();

    h.sandbox.inject_failure(
        DataScope::Eligibility,
        AdapterError::MemberNotFound("MBR-22819".to_string()),
    );
    let err = h
        .broker
        .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BrokerError::Adapter(AdapterError::MemberNotFound(_))
    ));

    let entry = h
        .cache
        .get(h.patient_id, DataScope::Eligibility)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, CacheStatus::Error);
    assert_eq!(entry.error_code.as_deref(), Some("MEMBER_NOT_FOUND"));
    assert!(entry.normalized_data.is_none());

    // The payer recovers; the error entry must not satisfy the next read.
    h.sandbox.clear_failures();
    let recovered = h
        .broker
        .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
        .await
        .unwrap();
    assert!(!recovered.cached);
    assert_eq!(h.sandbox.call_count(), 2);
}

#[tokio::test]
async fn repeated_auth_failures_deactivate_the_credential() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility]);
    let options = FetchOptions {
        force_refresh: true,
        ..FetchOptions::default()
    };

    h.sandbox.inject_failure(
        DataScope::Eligibility,
        AdapterError::AuthFailed("invalid api key".to_string()),
    );

    for _ in 0..5 {
        let err = h
            .broker
            .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Adapter(AdapterError::AuthFailed(_))));
    }

    assert!(h
        .vault
        .get_credentials(h.practice_id, "sandbox")
        .await
        .unwrap()
        .is_none());

    // Sixth attempt fails before reaching the adapter.
    let err = h
        .broker
        .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::NoValidCredentials(_)));
    assert_eq!(h.sandbox.call_count(), 5);
}

#[tokio::test]
async fn throttling_does_not_count_against_the_credential() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility]);
    let options = FetchOptions {
        force_refresh: true,
        ..FetchOptions::default()
    };

    h.sandbox.inject_failure(
        DataScope::Eligibility,
        AdapterError::RateLimited("try later".to_string()),
    );
    for _ in 0..5 {
        let _ = h
            .broker
            .fetch_insurance_data(&grant, DataScope::Eligibility, &options, &actor())
            .await
            .unwrap_err();
    }

    assert!(h
        .vault
        .get_credentials(h.practice_id, "sandbox")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn inactive_or_lapsed_grants_are_rejected() {
    let h = harness().await;

    let mut revoked = authorized_grant(&h, vec![DataScope::Eligibility]);
    revoked.status = AuthorizationStatus::Revoked;
    let err = h
        .broker
        .fetch_insurance_data(
            &revoked,
            DataScope::Eligibility,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::AuthorizationNotActive));

    let mut lapsed = authorized_grant(&h, vec![DataScope::Eligibility]);
    lapsed.expires_at = Utc::now() - Duration::days(1);
    let err = h
        .broker
        .fetch_insurance_data(
            &lapsed,
            DataScope::Eligibility,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::AuthorizationNotActive));
    assert_eq!(h.sandbox.call_count(), 0);

    // Rejections are audited as failed access attempts.
    let rejections = h
        .audit
        .query(
            &AuditQuery::new()
                .category(EventCategory::DataAccess)
                .patient(h.patient_id),
        )
        .await
        .unwrap();
    assert_eq!(rejections.len(), 2);
    assert!(rejections.iter().all(|r| !r.success));
}

#[tokio::test]
async fn fetch_all_reports_partial_failure_per_scope() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility, DataScope::Benefits]);

    h.sandbox.inject_failure(
        DataScope::Benefits,
        AdapterError::ServiceUnavailable("502".to_string()),
    );

    let results = h
        .broker
        .fetch_all_authorized_data(&grant, &FetchOptions::default(), &actor())
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[&DataScope::Eligibility].is_ok());
    assert!(matches!(
        results[&DataScope::Benefits],
        Err(BrokerError::Adapter(AdapterError::ServiceUnavailable(_)))
    ));
}

#[tokio::test]
async fn cached_data_read_filters_by_scope() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility, DataScope::Benefits]);

    h.broker
        .fetch_all_authorized_data(&grant, &FetchOptions::default(), &actor())
        .await;

    let all = h
        .broker
        .get_cached_data_for_patient(h.patient_id, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let benefits_only = h
        .broker
        .get_cached_data_for_patient(h.patient_id, Some(&[DataScope::Benefits]))
        .await
        .unwrap();
    assert_eq!(benefits_only.len(), 1);
    assert_eq!(benefits_only[0].scope, DataScope::Benefits);
}

#[tokio::test]
async fn refresh_sweep_refetches_every_authorized_scope() {
    let h = harness().await;
    let grant = authorized_grant(&h, vec![DataScope::Eligibility, DataScope::Benefits]);
    h.authorizations.insert(grant.clone()).await.unwrap();

    h.broker
        .fetch_all_authorized_data(&grant, &FetchOptions::default(), &actor())
        .await;
    assert_eq!(h.sandbox.call_count(), 2);

    let refreshed = h.broker.refresh_stale_data(h.patient_id).await.unwrap();
    assert_eq!(refreshed, 2);
    assert_eq!(h.sandbox.call_count(), 4);
}

#[tokio::test]
async fn health_sweep_persists_observed_state() {
    let h = harness().await;

    let reports = h.broker.check_all_payer_health().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, HealthState::Healthy);

    let row = h.integrations.get("sandbox").await.unwrap().unwrap();
    assert_eq!(row.health, HealthState::Healthy);
    assert!(row.health_checked_at.is_some());

    let down = harness_with_adapter(SandboxAdapter::new("sandbox").unhealthy()).await;
    let reports = down.broker.check_all_payer_health().await.unwrap();
    assert_eq!(reports[0].state, HealthState::Down);
    let row = down.integrations.get("sandbox").await.unwrap().unwrap();
    assert_eq!(row.health, HealthState::Down);
}

#[tokio::test]
async fn consent_lifecycle_end_to_end() {
    let h = harness().await;

    let consent = ConsentService::new(
        h.authorizations.clone(),
        Arc::new(LoggingSender),
        h.audit.clone(),
        Arc::new(BrokerCacheInvalidator::new(h.cache.clone())),
        "https://portal.example.com",
    );

    // Practice requests authorization; patient receives a link.
    let pending = consent
        .create_authorization(CreateAuthorizationRequest {
            practice_id: h.practice_id,
            patient_id: h.patient_id,
            scopes: vec![DataScope::Eligibility, DataScope::ClaimsHistory],
            delivery_method: DeliveryMethod::Email,
            email: Some("ana@example.com".to_string()),
            phone: None,
            requested_by: "dr-chen".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(pending.status, AuthorizationStatus::Pending);

    // Data access is rejected while consent is pending.
    let err = h
        .broker
        .fetch_insurance_data(
            &pending,
            DataScope::Eligibility,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::AuthorizationNotActive));

    // Patient opens the link and authorizes.
    let client = ClientInfo {
        ip_address: Some("203.0.113.9".to_string()),
        user_agent: Some("Mozilla/5.0".to_string()),
    };
    consent.view_by_token(&pending.token, &client).await.unwrap();
    let granted = consent
        .decide_by_token(
            &pending.token,
            ConsentDecision::Authorize {
                signature: "Ana Moreno".to_string(),
            },
            &client,
        )
        .await
        .unwrap();
    assert_eq!(granted.status, AuthorizationStatus::Authorized);

    // Fetch, then serve from cache.
    let fetched = h
        .broker
        .fetch_insurance_data(
            &granted,
            DataScope::Eligibility,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap();
    assert!(!fetched.cached);
    let again = h
        .broker
        .fetch_insurance_data(
            &granted,
            DataScope::Eligibility,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap();
    assert!(again.cached);
    assert_eq!(h.sandbox.call_count(), 1);

    // Revocation flags cached data stale and closes the tap.
    consent
        .revoke(granted.id, "patient request", "dr-chen")
        .await
        .unwrap();
    let entry = h
        .cache
        .get(h.patient_id, DataScope::Eligibility)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_stale);

    let revoked = h
        .authorizations
        .get(granted.id)
        .await
        .unwrap()
        .unwrap();
    let err = h
        .broker
        .fetch_insurance_data(
            &revoked,
            DataScope::Eligibility,
            &FetchOptions::default(),
            &actor(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::AuthorizationNotActive));

    // The whole story is on one verifiable chain.
    let report = h.audit.verify_integrity().await.unwrap();
    assert!(report.valid);
    assert!(report.records_checked >= 6);

    let disclosures = h
        .audit
        .query(&AuditQuery::for_resource(
            "insurance_data",
            &h.patient_id.to_string(),
        ))
        .await
        .unwrap();
    assert!(disclosures.len() >= 4);
}
