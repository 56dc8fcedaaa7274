use anyhow::Context;
use audit_trail::{AuditTrail, InMemoryAuditStore};
use chrono::{DateTime, Utc};
use consent_service::{ConsentService, InMemoryAuthorizationRepository, LoggingSender};
use credential_vault::{CredentialVault, InMemoryCredentialRepository, MasterKey};
use payer_adapters::{AdapterRegistry, PayerAdapter, SandboxAdapter};
use payer_broker::{
    BrokerCacheInvalidator, InMemoryCacheRepository, InMemoryDirectory,
    InMemoryIntegrationRepository, PayerDataBroker,
};
use std::sync::Arc;
use tracing::info;

const BASE_URL_ENV: &str = "BROKER_BASE_URL";

/// Everything the handlers need, wired once at startup.
///
/// Storage is in-memory; a deployment wanting durability swaps the repository
/// implementations here and nowhere else.
#[derive(Clone)]
pub struct AppState {
    pub consent: Arc<ConsentService>,
    pub broker: Arc<PayerDataBroker>,
    pub vault: Arc<CredentialVault>,
    pub audit: Arc<AuditTrail>,
    pub directory: Arc<InMemoryDirectory>,
    pub integrations: Arc<InMemoryIntegrationRepository>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn from_env() -> anyhow::Result<Self> {
        let key = MasterKey::from_env().context("loading vault master key")?;
        let vault = Arc::new(CredentialVault::new(
            &key,
            Arc::new(InMemoryCredentialRepository::new()),
        )?);

        let audit = Arc::new(AuditTrail::new(Arc::new(InMemoryAuditStore::new())).await?);
        let cache = Arc::new(InMemoryCacheRepository::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let integrations = Arc::new(InMemoryIntegrationRepository::new());
        let authorizations = Arc::new(InMemoryAuthorizationRepository::new());

        let mut registry = AdapterRegistry::new();
        for adapter in configured_adapters() {
            registry.register(adapter);
        }
        let registry = Arc::new(registry);

        let base_url = std::env::var(BASE_URL_ENV)
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let consent = Arc::new(ConsentService::new(
            authorizations.clone(),
            Arc::new(LoggingSender),
            audit.clone(),
            Arc::new(BrokerCacheInvalidator::new(cache.clone())),
            &base_url,
        ));

        let broker = Arc::new(PayerDataBroker::new(
            registry,
            vault.clone(),
            cache,
            integrations.clone(),
            directory.clone(),
            authorizations,
            audit.clone(),
        ));

        info!(base_url = %base_url, "application state initialized");
        Ok(Self {
            consent,
            broker,
            vault,
            audit,
            directory,
            integrations,
            started_at: Utc::now(),
        })
    }
}

/// Adapters available in this build. Real payer integrations register here;
/// the sandbox payer is always present for onboarding and smoke tests.
fn configured_adapters() -> Vec<Arc<dyn PayerAdapter>> {
    vec![Arc::new(SandboxAdapter::new("sandbox"))]
}
