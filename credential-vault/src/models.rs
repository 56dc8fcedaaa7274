use crate::encryption::SealedSecret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consecutive use-time failures before a credential is deactivated.
pub const MAX_ERROR_COUNT: u32 = 5;

/// Declared shape of a credential bundle, stored alongside the ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    OauthClient,
    ApiKey,
    UsernamePassword,
    Certificate,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OauthClient => "oauth_client",
            Self::ApiKey => "api_key",
            Self::UsernamePassword => "username_password",
            Self::Certificate => "certificate",
        }
    }
}

/// Decrypted credential bundle, discriminated by `type`.
///
/// Anything that does not deserialize into one of these four shapes is
/// rejected at decrypt time; the vault never hands out an unrecognized blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialPayload {
    OauthClient {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
    ApiKey {
        api_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        api_secret: Option<String>,
    },
    UsernamePassword {
        username: String,
        password: String,
    },
    Certificate {
        certificate_pem: String,
        private_key_pem: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
}

impl CredentialPayload {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::OauthClient { .. } => CredentialType::OauthClient,
            Self::ApiKey { .. } => CredentialType::ApiKey,
            Self::UsernamePassword { .. } => CredentialType::UsernamePassword,
            Self::Certificate { .. } => CredentialType::Certificate,
        }
    }
}

/// One credential row per (practice, payer) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerCredential {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub payer_code: String,
    pub sealed: SealedSecret,
    pub credential_type: CredentialType,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub last_rotated: DateTime<Utc>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayerCredential {
    /// Whether the row has passed its declared expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A credential resolved for use: decrypted payload plus row bookkeeping.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    pub credential_id: Uuid,
    pub practice_id: Uuid,
    pub payer_code: String,
    pub credential_type: CredentialType,
    pub payload: CredentialPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tag_round_trips() {
        let payload = CredentialPayload::OauthClient {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            token_url: "https://payer.example/oauth/token".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"oauth_client\""));
        let back: CredentialPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn unknown_payload_shape_rejected() {
        let err = serde_json::from_str::<CredentialPayload>(
            "{\"type\":\"magic_link\",\"url\":\"x\"}",
        );
        assert!(err.is_err());
    }

    #[test]
    fn payload_type_matches_tag() {
        let payload = CredentialPayload::ApiKey {
            api_key: "k".into(),
            api_secret: None,
        };
        assert_eq!(payload.credential_type(), CredentialType::ApiKey);
    }
}
