use crate::error::BrokerResult;
use async_trait::async_trait;
use broker_common::DataScope;
use chrono::{DateTime, Utc};
use consent_service::CacheInvalidator;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Success,
    Error,
}

/// Latest-known payer data for one (patient, data type) pair. A fetch always
/// overwrites the prior entry; there is no history.
///
/// `is_stale` is forced true by consent revocation and is independent of the
/// time-based `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub patient_id: Uuid,
    pub scope: DataScope,
    pub payer_code: String,
    pub status: CacheStatus,
    pub normalized_data: Option<serde_json::Value>,
    pub raw_response: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_stale: bool,
}

impl CacheEntry {
    /// Servable as a cache hit: successful, unexpired, and not flagged stale.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.status == CacheStatus::Success && !self.is_stale && self.expires_at > now
    }
}

/// Storage for cache entries. Overwrites are read-modify-write per
/// (patient, scope) key and must not lose updates under concurrency.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn get(&self, patient_id: Uuid, scope: DataScope) -> BrokerResult<Option<CacheEntry>>;

    /// Insert or overwrite the entry for the entry's (patient, scope) key.
    async fn upsert(&self, entry: CacheEntry) -> BrokerResult<()>;

    async fn list_for_patient(&self, patient_id: Uuid) -> BrokerResult<Vec<CacheEntry>>;

    /// Flag every entry for the patient stale, regardless of remaining TTL.
    async fn mark_patient_stale(&self, patient_id: Uuid) -> BrokerResult<u64>;
}

/// In-memory cache store.
#[derive(Default)]
pub struct InMemoryCacheRepository {
    entries: DashMap<(Uuid, DataScope), CacheEntry>,
}

impl InMemoryCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheRepository for InMemoryCacheRepository {
    async fn get(&self, patient_id: Uuid, scope: DataScope) -> BrokerResult<Option<CacheEntry>> {
        Ok(self.entries.get(&(patient_id, scope)).map(|e| e.clone()))
    }

    async fn upsert(&self, entry: CacheEntry) -> BrokerResult<()> {
        self.entries.insert((entry.patient_id, entry.scope), entry);
        Ok(())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> BrokerResult<Vec<CacheEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.patient_id == patient_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn mark_patient_stale(&self, patient_id: Uuid) -> BrokerResult<u64> {
        let mut flagged = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.patient_id == patient_id && !entry.is_stale {
                entry.is_stale = true;
                flagged += 1;
            }
        }
        Ok(flagged)
    }
}

/// Adapts the cache to the consent workflow's revocation hook.
pub struct BrokerCacheInvalidator {
    cache: Arc<dyn CacheRepository>,
}

impl BrokerCacheInvalidator {
    pub fn new(cache: Arc<dyn CacheRepository>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CacheInvalidator for BrokerCacheInvalidator {
    async fn mark_patient_stale(&self, patient_id: Uuid) -> Result<(), String> {
        self.cache
            .mark_patient_stale(patient_id)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry(patient_id: Uuid, scope: DataScope, ttl_hours: i64) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            patient_id,
            scope,
            payer_code: "acme_health".into(),
            status: CacheStatus::Success,
            normalized_data: Some(json!({ "eligible": true })),
            raw_response: None,
            error_code: None,
            error_message: None,
            fetched_at: now,
            expires_at: now + Duration::hours(ttl_hours),
            is_stale: false,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_prior_entry() {
        let cache = InMemoryCacheRepository::new();
        let patient = Uuid::new_v4();

        cache.upsert(entry(patient, DataScope::Eligibility, 24)).await.unwrap();
        let mut second = entry(patient, DataScope::Eligibility, 24);
        second.normalized_data = Some(json!({ "eligible": false }));
        cache.upsert(second).await.unwrap();

        let stored = cache.get(patient, DataScope::Eligibility).await.unwrap().unwrap();
        assert_eq!(stored.normalized_data, Some(json!({ "eligible": false })));
        assert_eq!(cache.list_for_patient(patient).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn freshness_respects_ttl_staleness_and_status() {
        let now = Utc::now();
        let patient = Uuid::new_v4();

        let fresh = entry(patient, DataScope::Eligibility, 24);
        assert!(fresh.is_fresh(now));

        let mut expired = entry(patient, DataScope::Eligibility, 24);
        expired.expires_at = now - Duration::minutes(1);
        assert!(!expired.is_fresh(now));

        let mut stale = entry(patient, DataScope::Eligibility, 24);
        stale.is_stale = true;
        assert!(!stale.is_fresh(now));

        let mut errored = entry(patient, DataScope::Eligibility, 24);
        errored.status = CacheStatus::Error;
        assert!(!errored.is_fresh(now));
    }

    #[tokio::test]
    async fn mark_patient_stale_covers_all_scopes_for_that_patient_only() {
        let cache = InMemoryCacheRepository::new();
        let patient = Uuid::new_v4();
        let other = Uuid::new_v4();

        cache.upsert(entry(patient, DataScope::Eligibility, 24)).await.unwrap();
        cache.upsert(entry(patient, DataScope::Benefits, 24)).await.unwrap();
        cache.upsert(entry(other, DataScope::Eligibility, 24)).await.unwrap();

        let flagged = cache.mark_patient_stale(patient).await.unwrap();
        assert_eq!(flagged, 2);

        for entry in cache.list_for_patient(patient).await.unwrap() {
            assert!(entry.is_stale);
        }
        let untouched = cache.get(other, DataScope::Eligibility).await.unwrap().unwrap();
        assert!(!untouched.is_stale);
    }
}
