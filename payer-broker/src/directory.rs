use crate::error::BrokerResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use payer_adapters::PatientIdentity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient record as far as the broker cares: identity fields an insurer
/// needs plus the free-text provider name from the intake form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient_id: Uuid,
    pub practice_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub member_id: String,
    pub group_number: Option<String>,
    pub insurance_provider_name: String,
}

impl PatientProfile {
    pub fn identity(&self) -> PatientIdentity {
        PatientIdentity {
            patient_id: self.patient_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            date_of_birth: self.date_of_birth,
            member_id: self.member_id.clone(),
            group_number: self.group_number.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeProfile {
    pub practice_id: Uuid,
    pub name: String,
}

/// Patient/practice lookup. Record storage proper lives outside this system;
/// the broker only needs these key lookups.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn get_patient(&self, patient_id: Uuid) -> BrokerResult<Option<PatientProfile>>;
    async fn get_practice(&self, practice_id: Uuid) -> BrokerResult<Option<PracticeProfile>>;
}

/// In-memory directory for tests and development wiring.
#[derive(Default)]
pub struct InMemoryDirectory {
    patients: DashMap<Uuid, PatientProfile>,
    practices: DashMap<Uuid, PracticeProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_patient(&self, patient: PatientProfile) {
        self.patients.insert(patient.patient_id, patient);
    }

    pub fn add_practice(&self, practice: PracticeProfile) {
        self.practices.insert(practice.practice_id, practice);
    }
}

#[async_trait]
impl PatientDirectory for InMemoryDirectory {
    async fn get_patient(&self, patient_id: Uuid) -> BrokerResult<Option<PatientProfile>> {
        Ok(self.patients.get(&patient_id).map(|p| p.clone()))
    }

    async fn get_practice(&self, practice_id: Uuid) -> BrokerResult<Option<PracticeProfile>> {
        Ok(self.practices.get(&practice_id).map(|p| p.clone()))
    }
}
