use broker_common::DataScope;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days an unused authorization link stays valid.
pub const TOKEN_VALIDITY_DAYS: i64 = 7;
/// Days an authorized grant stays valid.
pub const GRANT_VALIDITY_DAYS: i64 = 365;
/// Resends allowed per authorization record.
pub const MAX_RESEND_COUNT: u32 = 3;
/// Views allowed on one link before it locks (anti-enumeration guard).
pub const MAX_LINK_ATTEMPTS: u32 = 5;
/// Authorization requests allowed per patient per rolling 24h window.
pub const MAX_REQUESTS_PER_WINDOW: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Pending,
    Authorized,
    Denied,
    Expired,
    Revoked,
}

impl AuthorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Expired | Self::Revoked)
    }
}

/// How the authorization link reaches the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Email,
    Sms,
}

/// One consent grant: the patient-approved, time-bounded, scope-limited
/// permission record gating all payer data access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAuthorization {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub patient_id: Uuid,
    pub scopes: Vec<DataScope>,
    pub status: AuthorizationStatus,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    pub token_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub delivery_method: DeliveryMethod,
    pub delivery_recipient: String,
    pub notification_sent: bool,
    pub consent_given_at: Option<DateTime<Utc>>,
    pub consent_signature: Option<String>,
    pub consent_ip_address: Option<String>,
    pub consent_user_agent: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub resend_count: u32,
    pub link_attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientAuthorization {
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at <= now
    }

    /// Whether the unused token is close enough to expiry that a resend
    /// should mint a fresh one.
    pub fn token_near_expiry(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at - now < Duration::hours(24)
    }

    pub fn scope_authorized(&self, scope: DataScope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Patient decision submitted through the authorization link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConsentDecision {
    Authorize { signature: String },
    Deny,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!AuthorizationStatus::Pending.is_terminal());
        assert!(!AuthorizationStatus::Authorized.is_terminal());
        assert!(AuthorizationStatus::Denied.is_terminal());
        assert!(AuthorizationStatus::Expired.is_terminal());
        assert!(AuthorizationStatus::Revoked.is_terminal());
    }

    #[test]
    fn near_expiry_window_is_24h() {
        let now = Utc::now();
        let mut auth = PatientAuthorization {
            id: Uuid::new_v4(),
            practice_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            scopes: vec![DataScope::Eligibility],
            status: AuthorizationStatus::Pending,
            token: "t".into(),
            token_expires_at: now + Duration::hours(30),
            token_used_at: None,
            expires_at: now + Duration::days(GRANT_VALIDITY_DAYS),
            delivery_method: DeliveryMethod::Email,
            delivery_recipient: "ada@example.com".into(),
            notification_sent: true,
            consent_given_at: None,
            consent_signature: None,
            consent_ip_address: None,
            consent_user_agent: None,
            revoked_at: None,
            revoked_reason: None,
            resend_count: 0,
            link_attempt_count: 0,
            created_at: now,
            updated_at: now,
        };
        assert!(!auth.token_near_expiry(now));
        auth.token_expires_at = now + Duration::hours(23);
        assert!(auth.token_near_expiry(now));
    }
}
