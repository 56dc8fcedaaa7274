use crate::encryption::VaultCipher;
use crate::error::{VaultError, VaultResult};
use crate::key::MasterKey;
use crate::models::{ActiveCredential, CredentialPayload, PayerCredential};
use crate::store::{CredentialHealth, CredentialRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The vault: seals credential bundles into the repository and resolves them
/// for use, enforcing lifecycle rules on every read.
pub struct CredentialVault {
    cipher: VaultCipher,
    repository: Arc<dyn CredentialRepository>,
}

impl CredentialVault {
    pub fn new(key: &MasterKey, repository: Arc<dyn CredentialRepository>) -> VaultResult<Self> {
        Ok(Self {
            cipher: VaultCipher::new(key)?,
            repository,
        })
    }

    /// Store (or overwrite) the credential bundle for a (practice, payer)
    /// pair. An existing row is replaced and its rotation/error counters
    /// reset; there is no separate rotation state.
    pub async fn store_credentials(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        payload: &CredentialPayload,
        expires_at: Option<DateTime<Utc>>,
    ) -> VaultResult<PayerCredential> {
        let serialized = serde_json::to_vec(payload)
            .map_err(|e| VaultError::InvalidPayload(e.to_string()))?;
        let sealed = self.cipher.seal(&serialized)?;

        let now = Utc::now();
        let existing = self.repository.get(practice_id, payer_code).await?;
        let credential = PayerCredential {
            id: existing.as_ref().map_or_else(Uuid::new_v4, |c| c.id),
            practice_id,
            payer_code: payer_code.to_string(),
            sealed,
            credential_type: payload.credential_type(),
            is_active: true,
            expires_at,
            last_used: None,
            last_rotated: now,
            error_count: 0,
            last_error: None,
            created_at: existing.as_ref().map_or(now, |c| c.created_at),
            updated_at: now,
        };

        self.repository.upsert(credential.clone()).await?;
        info!(
            practice_id = %practice_id,
            payer_code,
            credential_type = credential.credential_type.as_str(),
            rotated = existing.is_some(),
            "stored payer credentials"
        );
        Ok(credential)
    }

    /// Rotation is a fresh store with the same upsert semantics.
    pub async fn rotate_credentials(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        payload: &CredentialPayload,
        expires_at: Option<DateTime<Utc>>,
    ) -> VaultResult<PayerCredential> {
        self.store_credentials(practice_id, payer_code, payload, expires_at)
            .await
    }

    /// Resolve usable credentials for a (practice, payer) pair.
    ///
    /// Returns `None` when there is no row, the row is inactive, the row has
    /// expired (deactivated lazily here), or decryption fails. A decryption
    /// failure is recorded as a use-time error and counts toward deactivation.
    pub async fn get_credentials(
        &self,
        practice_id: Uuid,
        payer_code: &str,
    ) -> VaultResult<Option<ActiveCredential>> {
        let Some(row) = self.repository.get(practice_id, payer_code).await? else {
            return Ok(None);
        };

        if !row.is_active {
            return Ok(None);
        }

        let now = Utc::now();
        if row.is_expired(now) {
            self.repository.deactivate(practice_id, payer_code).await?;
            info!(practice_id = %practice_id, payer_code, "credential expired; deactivated");
            return Ok(None);
        }

        let plaintext = match self.cipher.open(&row.sealed) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(practice_id = %practice_id, payer_code, error = %e, "credential decryption failed");
                self.record_error(practice_id, payer_code, "decryption failed")
                    .await?;
                return Ok(None);
            }
        };

        let payload: CredentialPayload = match serde_json::from_slice(&plaintext) {
            Ok(p) => p,
            Err(e) => {
                warn!(practice_id = %practice_id, payer_code, error = %e, "credential payload unrecognized");
                self.record_error(practice_id, payer_code, "unrecognized payload shape")
                    .await?;
                return Ok(None);
            }
        };

        if payload.credential_type() != row.credential_type {
            let mismatch = VaultError::TypeMismatch {
                declared: row.credential_type.as_str().to_string(),
                actual: payload.credential_type().as_str().to_string(),
            };
            warn!(practice_id = %practice_id, payer_code, error = %mismatch, "credential type mismatch");
            self.record_error(practice_id, payer_code, &mismatch.to_string())
                .await?;
            return Ok(None);
        }

        Ok(Some(ActiveCredential {
            credential_id: row.id,
            practice_id,
            payer_code: payer_code.to_string(),
            credential_type: row.credential_type,
            payload,
        }))
    }

    /// Record a successful use; resets the error counter.
    pub async fn record_usage(&self, practice_id: Uuid, payer_code: &str) -> VaultResult<()> {
        self.repository
            .mark_used(practice_id, payer_code, Utc::now())
            .await
    }

    /// Record a use-time failure; five consecutive failures deactivate the
    /// credential atomically with the fifth increment.
    pub async fn record_error(
        &self,
        practice_id: Uuid,
        payer_code: &str,
        message: &str,
    ) -> VaultResult<CredentialHealth> {
        let health = self
            .repository
            .mark_error(practice_id, payer_code, message, Utc::now())
            .await?;
        if !health.is_active {
            warn!(
                practice_id = %practice_id,
                payer_code,
                error_count = health.error_count,
                "credential deactivated after repeated failures"
            );
        }
        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredentialType, MAX_ERROR_COUNT};
    use crate::store::InMemoryCredentialRepository;
    use chrono::Duration;

    fn vault() -> CredentialVault {
        vault_with_repo().0
    }

    fn vault_with_repo() -> (CredentialVault, Arc<InMemoryCredentialRepository>) {
        let key = MasterKey::from_hex(&MasterKey::generate_hex()).unwrap();
        let repo = Arc::new(InMemoryCredentialRepository::new());
        let vault = CredentialVault::new(&key, repo.clone()).unwrap();
        (vault, repo)
    }

    fn api_key_payload() -> CredentialPayload {
        CredentialPayload::ApiKey {
            api_key: "sk-payer-123".into(),
            api_secret: Some("shh".into()),
        }
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let vault = vault();
        let practice = Uuid::new_v4();
        vault
            .store_credentials(practice, "acme_health", &api_key_payload(), None)
            .await
            .unwrap();

        let active = vault
            .get_credentials(practice, "acme_health")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.payload, api_key_payload());
        assert_eq!(active.credential_type, CredentialType::ApiKey);
    }

    #[tokio::test]
    async fn missing_credentials_resolve_to_none() {
        let vault = vault();
        let resolved = vault
            .get_credentials(Uuid::new_v4(), "acme_health")
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn expired_credentials_deactivate_lazily() {
        let vault = vault();
        let practice = Uuid::new_v4();
        let past = Utc::now() - Duration::hours(1);
        vault
            .store_credentials(practice, "acme_health", &api_key_payload(), Some(past))
            .await
            .unwrap();

        assert!(vault
            .get_credentials(practice, "acme_health")
            .await
            .unwrap()
            .is_none());

        // The row itself is now inactive, not merely filtered out
        let health = vault
            .record_error(practice, "acme_health", "auth failed")
            .await
            .unwrap();
        assert!(!health.is_active);
    }

    #[tokio::test]
    async fn five_errors_deactivate_sixth_use_rejected() {
        let vault = vault();
        let practice = Uuid::new_v4();
        vault
            .store_credentials(practice, "acme_health", &api_key_payload(), None)
            .await
            .unwrap();

        for i in 1..MAX_ERROR_COUNT {
            let health = vault
                .record_error(practice, "acme_health", "auth failed")
                .await
                .unwrap();
            assert_eq!(health.error_count, i);
            assert!(health.is_active);
        }

        let health = vault
            .record_error(practice, "acme_health", "auth failed")
            .await
            .unwrap();
        assert_eq!(health.error_count, MAX_ERROR_COUNT);
        assert!(!health.is_active);

        // Deactivated row resolves to None before any network call is made
        assert!(vault
            .get_credentials(practice, "acme_health")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn declared_type_mismatch_is_rejected_and_counted() {
        let (vault, repo) = vault_with_repo();
        let practice = Uuid::new_v4();
        vault
            .store_credentials(practice, "acme_health", &api_key_payload(), None)
            .await
            .unwrap();

        // Corrupt the declared type out from under the sealed payload
        let mut row = repo.get(practice, "acme_health").await.unwrap().unwrap();
        row.credential_type = CredentialType::OauthClient;
        repo.upsert(row).await.unwrap();

        assert!(vault
            .get_credentials(practice, "acme_health")
            .await
            .unwrap()
            .is_none());

        let row = repo.get(practice, "acme_health").await.unwrap().unwrap();
        assert_eq!(row.error_count, 1);
        assert!(row
            .last_error
            .unwrap()
            .contains("oauth_client does not match payload type api_key"));
    }

    #[tokio::test]
    async fn usage_resets_error_count() {
        let vault = vault();
        let practice = Uuid::new_v4();
        vault
            .store_credentials(practice, "acme_health", &api_key_payload(), None)
            .await
            .unwrap();

        for _ in 0..4 {
            vault
                .record_error(practice, "acme_health", "auth failed")
                .await
                .unwrap();
        }
        vault.record_usage(practice, "acme_health").await.unwrap();

        // Counter restarted; one more failure is nowhere near deactivation
        let health = vault
            .record_error(practice, "acme_health", "auth failed")
            .await
            .unwrap();
        assert_eq!(health.error_count, 1);
        assert!(health.is_active);
    }

    #[tokio::test]
    async fn rotation_overwrites_and_resets_counters() {
        let vault = vault();
        let practice = Uuid::new_v4();
        let first = vault
            .store_credentials(practice, "acme_health", &api_key_payload(), None)
            .await
            .unwrap();
        for _ in 0..3 {
            vault
                .record_error(practice, "acme_health", "auth failed")
                .await
                .unwrap();
        }

        let rotated_payload = CredentialPayload::OauthClient {
            client_id: "new-cid".into(),
            client_secret: "new-secret".into(),
            token_url: "https://payer.example/token".into(),
        };
        let rotated = vault
            .rotate_credentials(practice, "acme_health", &rotated_payload, None)
            .await
            .unwrap();

        assert_eq!(rotated.id, first.id);
        assert_eq!(rotated.error_count, 0);
        assert!(rotated.is_active);
        assert_eq!(rotated.credential_type, CredentialType::OauthClient);

        let active = vault
            .get_credentials(practice, "acme_health")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.payload, rotated_payload);
    }
}
