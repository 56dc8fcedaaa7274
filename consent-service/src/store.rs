use crate::error::{ConsentError, ConsentResult};
use crate::models::{AuthorizationStatus, PatientAuthorization};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Storage for authorization records.
///
/// `claim_token` is the exactly-once guard for transitions out of `pending`:
/// it must set `token_used_at` atomically and report whether this caller won.
#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    async fn insert(&self, authorization: PatientAuthorization) -> ConsentResult<()>;

    async fn get(&self, id: Uuid) -> ConsentResult<Option<PatientAuthorization>>;

    async fn get_by_token(&self, token: &str) -> ConsentResult<Option<PatientAuthorization>>;

    /// Overwrite the stored record.
    async fn update(&self, authorization: PatientAuthorization) -> ConsentResult<()>;

    /// Atomically stamp `token_used_at` if it is unset. `true` means this
    /// caller consumed the token; `false` means somebody already did.
    async fn claim_token(&self, id: Uuid, now: DateTime<Utc>) -> ConsentResult<bool>;

    /// All grants for a patient in the given status.
    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AuthorizationStatus>,
    ) -> ConsentResult<Vec<PatientAuthorization>>;
}

/// In-memory authorization store backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryAuthorizationRepository {
    rows: DashMap<Uuid, PatientAuthorization>,
    by_token: DashMap<String, Uuid>,
}

impl InMemoryAuthorizationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationRepository for InMemoryAuthorizationRepository {
    async fn insert(&self, authorization: PatientAuthorization) -> ConsentResult<()> {
        self.by_token
            .insert(authorization.token.clone(), authorization.id);
        self.rows.insert(authorization.id, authorization);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ConsentResult<Option<PatientAuthorization>> {
        Ok(self.rows.get(&id).map(|r| r.clone()))
    }

    async fn get_by_token(&self, token: &str) -> ConsentResult<Option<PatientAuthorization>> {
        let Some(id) = self.by_token.get(token).map(|r| *r) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn update(&self, authorization: PatientAuthorization) -> ConsentResult<()> {
        let previous = self
            .rows
            .get(&authorization.id)
            .map(|r| r.token.clone())
            .ok_or(ConsentError::NotFound)?;
        if previous != authorization.token {
            self.by_token.remove(&previous);
            self.by_token
                .insert(authorization.token.clone(), authorization.id);
        }
        self.rows.insert(authorization.id, authorization);
        Ok(())
    }

    async fn claim_token(&self, id: Uuid, now: DateTime<Utc>) -> ConsentResult<bool> {
        let mut row = self.rows.get_mut(&id).ok_or(ConsentError::NotFound)?;
        if row.token_used_at.is_some() {
            return Ok(false);
        }
        row.token_used_at = Some(now);
        row.updated_at = now;
        Ok(true)
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AuthorizationStatus>,
    ) -> ConsentResult<Vec<PatientAuthorization>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| r.clone())
            .collect())
    }
}
