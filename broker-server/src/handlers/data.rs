use crate::error::{ApiError, ApiResponse};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use broker_common::DataScope;
use chrono::{DateTime, Utc};
use credential_vault::{CredentialPayload, CredentialType};
use payer_adapters::DateRange;
use payer_broker::{CacheEntry, FetchOptions, FetchOutcome, PayerHealthReport, RequestActor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

fn parse_scope(raw: &str) -> Result<DataScope, ApiError> {
    raw.parse::<DataScope>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

// ---------------------------------------------------------------------------
// Directory registration
// ---------------------------------------------------------------------------

/// POST /api/v1/patients
pub async fn register_patient(
    State(state): State<AppState>,
    Json(patient): Json<payer_broker::PatientProfile>,
) -> (StatusCode, Json<ApiResponse<Uuid>>) {
    let id = patient.patient_id;
    state.directory.add_patient(patient);
    (StatusCode::CREATED, Json(ApiResponse::new(id)))
}

/// POST /api/v1/practices
pub async fn register_practice(
    State(state): State<AppState>,
    Json(practice): Json<payer_broker::PracticeProfile>,
) -> (StatusCode, Json<ApiResponse<Uuid>>) {
    let id = practice.practice_id;
    state.directory.add_practice(practice);
    (StatusCode::CREATED, Json(ApiResponse::new(id)))
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StoreCredentialsRequest {
    pub payload: CredentialPayload,
    pub expires_at: Option<DateTime<Utc>>,
}

/// What the practice gets back. Secret material never leaves the vault.
#[derive(Debug, Serialize)]
pub struct CredentialSummary {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub payer_code: String,
    pub credential_type: CredentialType,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_rotated: DateTime<Utc>,
}

/// PUT /api/v1/practices/:practice_id/payers/:payer_code/credentials
pub async fn store_credentials(
    State(state): State<AppState>,
    Path((practice_id, payer_code)): Path<(Uuid, String)>,
    Json(request): Json<StoreCredentialsRequest>,
) -> Result<Json<ApiResponse<CredentialSummary>>, ApiError> {
    let row = state
        .vault
        .store_credentials(practice_id, &payer_code, &request.payload, request.expires_at)
        .await?;
    Ok(Json(ApiResponse::new(CredentialSummary {
        id: row.id,
        practice_id: row.practice_id,
        payer_code: row.payer_code,
        credential_type: row.credential_type,
        is_active: row.is_active,
        expires_at: row.expires_at,
        last_rotated: row.last_rotated,
    })))
}

// ---------------------------------------------------------------------------
// Data fetch
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct FetchRequest {
    #[serde(default)]
    pub force_refresh: bool,
    pub cache_ttl_hours: Option<i64>,
    pub service_code: Option<String>,
    pub date_range: Option<DateRange>,
    pub requested_by: Option<String>,
}

impl FetchRequest {
    fn options(&self) -> FetchOptions {
        FetchOptions {
            force_refresh: self.force_refresh,
            cache_ttl_hours: self.cache_ttl_hours,
            service_code: self.service_code.clone(),
            date_range: self.date_range,
        }
    }

    fn actor(&self) -> RequestActor {
        match &self.requested_by {
            Some(who) => RequestActor::user(who),
            None => RequestActor::system(),
        }
    }
}

/// POST /api/v1/authorizations/:id/data/:scope
pub async fn fetch_data(
    State(state): State<AppState>,
    Path((id, scope)): Path<(Uuid, String)>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<ApiResponse<FetchOutcome>>, ApiError> {
    let scope = parse_scope(&scope)?;
    let authorization = state
        .consent
        .get_authorization(id)
        .await?
        .ok_or_else(|| ApiError::not_found("authorization"))?;

    let outcome = state
        .broker
        .fetch_insurance_data(&authorization, scope, &request.options(), &request.actor())
        .await?;
    Ok(Json(ApiResponse::new(outcome)))
}

/// Per-scope result in a fan-out response.
#[derive(Debug, Serialize)]
pub struct ScopeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<FetchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/v1/authorizations/:id/data
pub async fn fetch_all_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<ApiResponse<HashMap<DataScope, ScopeResult>>>, ApiError> {
    let authorization = state
        .consent
        .get_authorization(id)
        .await?
        .ok_or_else(|| ApiError::not_found("authorization"))?;

    let results = state
        .broker
        .fetch_all_authorized_data(&authorization, &request.options(), &request.actor())
        .await;

    let body = results
        .into_iter()
        .map(|(scope, result)| {
            let entry = match result {
                Ok(outcome) => ScopeResult {
                    success: true,
                    outcome: Some(outcome),
                    error_code: None,
                    error: None,
                },
                Err(err) => ScopeResult {
                    success: false,
                    outcome: None,
                    error_code: Some(err.code().to_string()),
                    error: Some(err.to_string()),
                },
            };
            (scope, entry)
        })
        .collect();
    Ok(Json(ApiResponse::new(body)))
}

// ---------------------------------------------------------------------------
// Cache reads and maintenance
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CachedDataQuery {
    /// Comma-separated scope list; all scopes when absent.
    pub scopes: Option<String>,
}

/// GET /api/v1/patients/:patient_id/data/cached
pub async fn get_cached_data(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<CachedDataQuery>,
) -> Result<Json<ApiResponse<Vec<CacheEntry>>>, ApiError> {
    let scopes = match &query.scopes {
        Some(raw) => Some(
            raw.split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse_scope(s.trim()))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };

    let entries = state
        .broker
        .get_cached_data_for_patient(patient_id, scopes.as_deref())
        .await?;
    Ok(Json(ApiResponse::new(entries)))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refreshed: u64,
}

/// POST /api/v1/patients/:patient_id/data/refresh
pub async fn refresh_patient_data(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RefreshResponse>>, ApiError> {
    let refreshed = state.broker.refresh_stale_data(patient_id).await?;
    Ok(Json(ApiResponse::new(RefreshResponse { refreshed })))
}

/// GET /api/v1/payers/health
pub async fn payer_health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PayerHealthReport>>>, ApiError> {
    let reports = state.broker.check_all_payer_health().await?;
    Ok(Json(ApiResponse::new(reports)))
}
