use crate::entry::{AuditRecord, EventCategory};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter over the audit trail. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub practice_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub event_category: Option<EventCategory>,
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounting of disclosures: every event that touched one resource.
    pub fn for_resource(resource_type: &str, resource_id: &str) -> Self {
        Self {
            resource_type: Some(resource_type.to_string()),
            resource_id: Some(resource_id.to_string()),
            ..Self::default()
        }
    }

    pub fn practice(mut self, practice_id: Uuid) -> Self {
        self.practice_id = Some(practice_id);
        self
    }

    pub fn patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn category(mut self, category: EventCategory) -> Self {
        self.event_category = Some(category);
        self
    }

    pub fn event_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(event_type.to_string());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if self.practice_id.is_some() && record.practice_id != self.practice_id {
            return false;
        }
        if self.patient_id.is_some() && record.patient_id != self.patient_id {
            return false;
        }
        if let Some(category) = self.event_category {
            if record.event_category != category {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if &record.event_type != event_type {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if &record.resource_type != resource_type {
                return false;
            }
        }
        if let Some(resource_id) = &self.resource_id {
            if &record.resource_id != resource_id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp > to {
                return false;
            }
        }
        true
    }
}
