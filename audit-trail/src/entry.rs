use broker_common::ActorType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Digest value of the imaginary entry before the first one.
pub const GENESIS_HASH: &str = "0";

/// Broad category of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Consent,
    DataAccess,
    Credential,
    System,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::DataAccess => "data_access",
            Self::Credential => "credential",
            Self::System => "system",
        }
    }
}

/// One append-only audit record.
///
/// `previous_hash` links to the predecessor's `entry_hash`; `entry_hash` is
/// the SHA-256 digest over this record's content fields plus that link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event_category: EventCategory,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub practice_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub success: bool,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl AuditRecord {
    /// Recompute the content digest from the persisted fields.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.event_category.as_str().as_bytes());
        hasher.update(self.event_type.as_bytes());
        hasher.update(self.resource_type.as_bytes());
        hasher.update(self.resource_id.as_bytes());
        hasher.update(self.actor_type.as_str().as_bytes());
        if let Some(actor_id) = &self.actor_id {
            hasher.update(actor_id.as_bytes());
        }
        if let Some(ip) = &self.ip_address {
            hasher.update(ip.as_bytes());
        }
        hasher.update(self.details.to_string().as_bytes());
        hasher.update([self.success as u8]);
        hasher.update(self.previous_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Event content as supplied by callers; the trail adds identity, sequence,
/// timestamp, and chain linkage at write time.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_category: EventCategory,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub practice_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(
        event_category: EventCategory,
        event_type: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Self {
        Self {
            event_category,
            event_type: event_type.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            actor_type: ActorType::System,
            actor_id: None,
            practice_id: None,
            patient_id: None,
            ip_address: None,
            user_agent: None,
            details: serde_json::Value::Null,
            success: true,
        }
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: &str) -> Self {
        self.actor_type = actor_type;
        self.actor_id = Some(actor_id.to_string());
        self
    }

    pub fn practice(mut self, practice_id: Uuid) -> Self {
        self.practice_id = Some(practice_id);
        self
    }

    pub fn patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn outcome(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}
