use broker_common::DataScope;
use payer_adapters::AdapterError;
use thiserror::Error;

/// Broker-level rejections are distinct from adapter errors: they are never
/// retried automatically and require a human or consent-flow change.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("No active authorization")]
    AuthorizationNotActive,

    #[error("Data type {0} not authorized by this consent grant")]
    ScopeNotAuthorized(DataScope),

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Practice not found")]
    PracticeNotFound,

    #[error("Unsupported insurance provider: {0}")]
    UnsupportedProvider(String),

    #[error("Payer {payer_code} does not support {scope}")]
    CapabilityNotSupported {
        payer_code: String,
        scope: DataScope,
    },

    #[error("Payer integration not configured: {0}")]
    IntegrationNotConfigured(String),

    #[error("No valid credentials for payer {0}")]
    NoValidCredentials(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Vault error: {0}")]
    Vault(#[from] credential_vault::VaultError),

    #[error("Audit error: {0}")]
    Audit(#[from] audit_trail::AuditError),

    #[error("Consent error: {0}")]
    Consent(#[from] consent_service::ConsentError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BrokerError {
    /// Stable code for audit details and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationNotActive => "AUTHORIZATION_NOT_ACTIVE",
            Self::ScopeNotAuthorized(_) => "SCOPE_NOT_AUTHORIZED",
            Self::PatientNotFound => "PATIENT_NOT_FOUND",
            Self::PracticeNotFound => "PRACTICE_NOT_FOUND",
            Self::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            Self::CapabilityNotSupported { .. } => "CAPABILITY_NOT_SUPPORTED",
            Self::IntegrationNotConfigured(_) => "INTEGRATION_NOT_CONFIGURED",
            Self::NoValidCredentials(_) => "NO_VALID_CREDENTIALS",
            Self::Adapter(err) => err.code(),
            Self::Vault(_) => "VAULT_ERROR",
            Self::Audit(_) => "AUDIT_ERROR",
            Self::Consent(_) => "CONSENT_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
