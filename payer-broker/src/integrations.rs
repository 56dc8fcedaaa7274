use crate::error::BrokerResult;
use async_trait::async_trait;
use broker_common::HealthState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use payer_adapters::PayerIntegration;

/// Storage for payer integration configuration rows. Rows are created at
/// onboarding and updated only by health checks and admin configuration.
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn get(&self, payer_code: &str) -> BrokerResult<Option<PayerIntegration>>;

    async fn upsert(&self, integration: PayerIntegration) -> BrokerResult<()>;

    async fn list(&self) -> BrokerResult<Vec<PayerIntegration>>;

    /// Persist a health-check observation onto the row.
    async fn set_health(
        &self,
        payer_code: &str,
        health: HealthState,
        checked_at: DateTime<Utc>,
    ) -> BrokerResult<()>;
}

/// In-memory integration store.
#[derive(Default)]
pub struct InMemoryIntegrationRepository {
    rows: DashMap<String, PayerIntegration>,
}

impl InMemoryIntegrationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn get(&self, payer_code: &str) -> BrokerResult<Option<PayerIntegration>> {
        Ok(self.rows.get(payer_code).map(|r| r.clone()))
    }

    async fn upsert(&self, integration: PayerIntegration) -> BrokerResult<()> {
        self.rows.insert(integration.payer_code.clone(), integration);
        Ok(())
    }

    async fn list(&self) -> BrokerResult<Vec<PayerIntegration>> {
        Ok(self.rows.iter().map(|r| r.clone()).collect())
    }

    async fn set_health(
        &self,
        payer_code: &str,
        health: HealthState,
        checked_at: DateTime<Utc>,
    ) -> BrokerResult<()> {
        if let Some(mut row) = self.rows.get_mut(payer_code) {
            row.health = health;
            row.health_checked_at = Some(checked_at);
        }
        Ok(())
    }
}
