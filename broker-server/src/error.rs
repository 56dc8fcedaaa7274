use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use consent_service::ConsentError;
use payer_adapters::AdapterError;
use payer_broker::BrokerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Standard API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Unique error ID for log correlation
    pub error_id: String,
    pub error_type: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Standard API success wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Resource not found: {resource_type}")]
    NotFound { resource_type: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("No longer available: {message}")]
    Gone { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    #[error("Unprocessable request: {message}")]
    Unprocessable { message: String },

    #[error("Upstream payer failure: {message}")]
    Upstream { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Gone { .. } => StatusCode::GONE,
            ApiError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } => "bad_request",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::Conflict { .. } => "conflict",
            ApiError::Gone { .. } => "gone",
            ApiError::RateLimit { .. } => "rate_limit_exceeded",
            ApiError::Unprocessable { .. } => "unprocessable_entity",
            ApiError::Upstream { .. } => "upstream_payer_failure",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl From<ConsentError> for ApiError {
    fn from(err: ConsentError) -> Self {
        match err {
            ConsentError::NotFound => ApiError::NotFound {
                resource_type: "authorization".to_string(),
            },
            ConsentError::TokenExpired | ConsentError::TooManyLinkAttempts => ApiError::Gone {
                message: err.to_string(),
            },
            ConsentError::TokenAlreadyUsed
            | ConsentError::ResendLimitReached
            | ConsentError::InvalidState { .. } => ApiError::Conflict {
                message: err.to_string(),
            },
            ConsentError::RateLimited(_) => ApiError::RateLimit {
                message: err.to_string(),
            },
            ConsentError::EmptyScopes | ConsentError::DeliveryUnreachable(_) => {
                ApiError::BadRequest {
                    message: err.to_string(),
                }
            }
            ConsentError::Storage(_) | ConsentError::Audit(_) => ApiError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::AuthorizationNotActive | BrokerError::ScopeNotAuthorized(_) => {
                ApiError::Forbidden {
                    message: err.to_string(),
                }
            }
            BrokerError::PatientNotFound => ApiError::NotFound {
                resource_type: "patient".to_string(),
            },
            BrokerError::PracticeNotFound => ApiError::NotFound {
                resource_type: "practice".to_string(),
            },
            BrokerError::UnsupportedProvider(_)
            | BrokerError::CapabilityNotSupported { .. }
            | BrokerError::IntegrationNotConfigured(_) => ApiError::Unprocessable {
                message: err.to_string(),
            },
            BrokerError::NoValidCredentials(_) => ApiError::Conflict {
                message: err.to_string(),
            },
            BrokerError::Adapter(adapter_err) => match adapter_err {
                AdapterError::InvalidRequest(_) => ApiError::BadRequest {
                    message: adapter_err.to_string(),
                },
                AdapterError::MemberNotFound(_) => ApiError::NotFound {
                    resource_type: "member".to_string(),
                },
                AdapterError::AuthFailed(_)
                | AdapterError::RateLimited(_)
                | AdapterError::ServiceUnavailable(_) => ApiError::Upstream {
                    message: adapter_err.to_string(),
                },
            },
            BrokerError::Vault(_)
            | BrokerError::Audit(_)
            | BrokerError::Storage(_)
            | BrokerError::Consent(_) => ApiError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl From<credential_vault::VaultError> for ApiError {
    fn from(err: credential_vault::VaultError) -> Self {
        match err {
            credential_vault::VaultError::InvalidPayload(_) => ApiError::BadRequest {
                message: err.to_string(),
            },
            _ => ApiError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl From<audit_trail::AuditError> for ApiError {
    fn from(err: audit_trail::AuditError) -> Self {
        ApiError::Internal {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4().to_string();
        let status_code = self.status_code();

        error!(
            error_id = %error_id,
            error_type = %self.error_type(),
            status_code = %status_code.as_u16(),
            error = %self,
            "API error occurred"
        );

        let body = ApiErrorResponse {
            error_id,
            error_type: self.error_type().to_string(),
            message: self.to_string(),
            timestamp: chrono::Utc::now(),
        };

        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_common::DataScope;

    #[test]
    fn consent_errors_map_to_expected_statuses() {
        let gone: ApiError = ConsentError::TokenExpired.into();
        assert_eq!(gone.status_code(), StatusCode::GONE);

        let conflict: ApiError = ConsentError::TokenAlreadyUsed.into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let throttled: ApiError = ConsentError::RateLimited(3).into();
        assert_eq!(throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let unreachable: ApiError =
            ConsentError::DeliveryUnreachable("no email on file".to_string()).into();
        assert_eq!(unreachable.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn broker_errors_map_to_expected_statuses() {
        let forbidden: ApiError = BrokerError::ScopeNotAuthorized(DataScope::Benefits).into();
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

        let upstream: ApiError =
            BrokerError::Adapter(AdapterError::ServiceUnavailable("502".to_string())).into();
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);

        let missing: ApiError =
            BrokerError::Adapter(AdapterError::MemberNotFound("m".to_string())).into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }
}
