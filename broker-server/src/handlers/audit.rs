use crate::error::{ApiError, ApiResponse};
use crate::state::AppState;
use audit_trail::{AuditQuery, AuditRecord, EventCategory, IntegrityReport};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AuditEventsQuery {
    pub practice_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub category: Option<EventCategory>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditEventsQuery {
    fn into_query(self) -> AuditQuery {
        let mut query = AuditQuery::new();
        if let Some(practice_id) = self.practice_id {
            query = query.practice(practice_id);
        }
        if let Some(patient_id) = self.patient_id {
            query = query.patient(patient_id);
        }
        if let Some(category) = self.category {
            query = query.category(category);
        }
        if let Some(event_type) = &self.event_type {
            query = query.event_type(event_type);
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            query = query.between(from, to);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        query
    }
}

/// GET /api/v1/audit/events
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<AuditEventsQuery>,
) -> Result<Json<ApiResponse<Vec<AuditRecord>>>, ApiError> {
    let records = state.audit.query(&query.into_query()).await?;
    Ok(Json(ApiResponse::new(records)))
}

/// GET /api/v1/audit/disclosures/:resource_type/:resource_id
///
/// The accounting-of-disclosures view: everything that touched one resource.
pub async fn list_disclosures(
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<AuditRecord>>>, ApiError> {
    let records = state
        .audit
        .disclosures(&resource_type, &resource_id)
        .await?;
    Ok(Json(ApiResponse::new(records)))
}

/// POST /api/v1/audit/verify
pub async fn verify_chain(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<IntegrityReport>>, ApiError> {
    let report = state.audit.verify_integrity().await?;
    Ok(Json(ApiResponse::new(report)))
}
