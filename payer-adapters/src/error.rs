use thiserror::Error;

/// Typed adapter failures, so the broker can branch on the outcome:
/// `AuthFailed` feeds credential error counting, `RateLimited` must not,
/// `MemberNotFound` is a definitive negative, and so on.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("Payer rejected credentials: {0}")]
    AuthFailed(String),

    #[error("Payer throttled the request: {0}")]
    RateLimited(String),

    #[error("Payer service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Malformed request: {0}")]
    InvalidRequest(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),
}

impl AdapterError {
    /// Stable wire code for audit entries and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthFailed(_) => "AUTH_FAILED",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::MemberNotFound(_) => "MEMBER_NOT_FOUND",
        }
    }

    /// Whether this failure should count against the stored credential.
    pub fn counts_against_credential(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
