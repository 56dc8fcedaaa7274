use broker_common::{DataScope, HealthState};
use chrono::{DateTime, NaiveDate, Utc};
use credential_vault::CredentialPayload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol family of a payer's API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    Rest,
    Soap,
    Edi,
    Fhir,
}

/// One row per supported insurer: configuration, advertised capabilities,
/// and last observed health. Created at onboarding, updated only by health
/// checks and admin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerIntegration {
    pub payer_code: String,
    pub display_name: String,
    pub api_style: ApiStyle,
    pub supports_eligibility: bool,
    pub supports_benefits: bool,
    pub supports_claims_history: bool,
    pub supports_prior_auth: bool,
    pub health: HealthState,
    pub health_checked_at: Option<DateTime<Utc>>,
}

impl PayerIntegration {
    pub fn supports(&self, scope: DataScope) -> bool {
        match scope {
            DataScope::Eligibility => self.supports_eligibility,
            DataScope::Benefits => self.supports_benefits,
            DataScope::ClaimsHistory => self.supports_claims_history,
            DataScope::PriorAuth => self.supports_prior_auth,
        }
    }
}

/// Patient identity fields an insurer needs to locate a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_number: Option<String>,
}

/// Everything an adapter needs: patient identity, the resolved integration
/// row, and the decrypted credential.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub patient: PatientIdentity,
    pub integration: PayerIntegration,
    pub credential: CredentialPayload,
}

impl RequestContext {
    pub fn new(
        patient: PatientIdentity,
        integration: PayerIntegration,
        credential: CredentialPayload,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            patient,
            integration,
            credential,
        }
    }
}

/// Inclusive date range for claims-history queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Error detail carried inside a failed response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Uniform envelope every adapter data method resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterErrorDetail>,
    pub response_time_ms: u64,
    pub request_id: Uuid,
}

impl AdapterResponse {
    pub fn ok(
        request_id: Uuid,
        data: serde_json::Value,
        raw_response: Option<serde_json::Value>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            raw_response,
            error: None,
            response_time_ms,
            request_id,
        }
    }

    pub fn failed(
        request_id: Uuid,
        error: &crate::error::AdapterError,
        response_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            data: None,
            raw_response: None,
            error: Some(AdapterErrorDetail {
                code: error.code().to_string(),
                message: error.to_string(),
                details: None,
            }),
            response_time_ms,
            request_id,
        }
    }
}

/// Health probe result for one adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub state: HealthState,
    pub message: String,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}
