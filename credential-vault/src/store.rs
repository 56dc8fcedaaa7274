use crate::error::{VaultError, VaultResult};
use crate::models::{PayerCredential, MAX_ERROR_COUNT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Counter state after a recorded use-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHealth {
    pub error_count: u32,
    pub is_active: bool,
}

/// Storage for credential rows, keyed by (practice, payer).
///
/// Counter updates are read-modify-write; implementations must apply them
/// atomically per key so concurrent failures never lose an increment.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn get(&self, practice_id: Uuid, payer_code: &str)
        -> VaultResult<Option<PayerCredential>>;

    /// Insert or overwrite the row for (practice, payer).
    async fn upsert(&self, credential: PayerCredential) -> VaultResult<()>;

    /// Successful use: reset `error_count` to 0 and stamp `last_used`.
    async fn mark_used(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<()>;

    /// Use-time failure: increment `error_count`, record the message, and
    /// deactivate in the same update once the count reaches the limit.
    async fn mark_error(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<CredentialHealth>;

    /// Deactivate without touching counters (lazy expiry).
    async fn deactivate(&self, practice_id: Uuid, payer_code: &str) -> VaultResult<()>;
}

/// In-memory credential store backed by a concurrent map.
///
/// The per-shard lock of the map makes each counter update atomic for its key.
#[derive(Default)]
pub struct InMemoryCredentialRepository {
    rows: DashMap<(Uuid, String), PayerCredential>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(practice_id: Uuid, payer_code: &str) -> (Uuid, String) {
        (practice_id, payer_code.to_string())
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get(
        &self,
        practice_id: Uuid,
        payer_code: &str,
    ) -> VaultResult<Option<PayerCredential>> {
        Ok(self
            .rows
            .get(&Self::key(practice_id, payer_code))
            .map(|r| r.clone()))
    }

    async fn upsert(&self, credential: PayerCredential) -> VaultResult<()> {
        self.rows.insert(
            Self::key(credential.practice_id, &credential.payer_code),
            credential,
        );
        Ok(())
    }

    async fn mark_used(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<()> {
        let mut row = self
            .rows
            .get_mut(&Self::key(practice_id, payer_code))
            .ok_or_else(|| VaultError::Storage(format!("no credential for {payer_code}")))?;
        row.error_count = 0;
        row.last_error = None;
        row.last_used = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn mark_error(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<CredentialHealth> {
        let mut row = self
            .rows
            .get_mut(&Self::key(practice_id, payer_code))
            .ok_or_else(|| VaultError::Storage(format!("no credential for {payer_code}")))?;
        row.error_count = row.error_count.saturating_add(1);
        row.last_error = Some(message.to_string());
        row.updated_at = now;
        if row.error_count >= MAX_ERROR_COUNT {
            row.is_active = false;
        }
        Ok(CredentialHealth {
            error_count: row.error_count,
            is_active: row.is_active,
        })
    }

    async fn deactivate(&self, practice_id: Uuid, payer_code: &str) -> VaultResult<()> {
        if let Some(mut row) = self.rows.get_mut(&Self::key(practice_id, payer_code)) {
            row.is_active = false;
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}
