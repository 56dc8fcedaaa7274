use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsentError {
    #[error("Authorization not found")]
    NotFound,

    #[error("Authorization link has expired")]
    TokenExpired,

    #[error("Authorization link already used")]
    TokenAlreadyUsed,

    #[error("Too many attempts to open this authorization link")]
    TooManyLinkAttempts,

    #[error("Rate limit exceeded: {0} authorization requests in the last 24 hours")]
    RateLimited(u32),

    #[error("No reachable delivery channel: {0}")]
    DeliveryUnreachable(String),

    #[error("Resend limit reached")]
    ResendLimitReached,

    #[error("Invalid state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    #[error("At least one data scope is required")]
    EmptyScopes,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Audit error: {0}")]
    Audit(#[from] audit_trail::AuditError),
}

pub type ConsentResult<T> = Result<T, ConsentError>;
