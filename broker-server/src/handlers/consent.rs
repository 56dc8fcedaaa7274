use crate::error::{ApiError, ApiResponse};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use broker_common::DataScope;
use chrono::{DateTime, Utc};
use consent_service::{
    AuthorizationStatus, AuthorizationView, ClientInfo, ConsentDecision,
    CreateAuthorizationRequest, DeliveryMethod, PatientAuthorization,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Practice-facing view of an authorization. The single-use token is only
/// ever delivered to the patient, never echoed through this API.
#[derive(Debug, Serialize)]
pub struct AuthorizationSummary {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub patient_id: Uuid,
    pub scopes: Vec<DataScope>,
    pub status: AuthorizationStatus,
    pub delivery_method: DeliveryMethod,
    pub notification_sent: bool,
    pub token_expires_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consent_given_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub resend_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<PatientAuthorization> for AuthorizationSummary {
    fn from(a: PatientAuthorization) -> Self {
        Self {
            id: a.id,
            practice_id: a.practice_id,
            patient_id: a.patient_id,
            scopes: a.scopes,
            status: a.status,
            delivery_method: a.delivery_method,
            notification_sent: a.notification_sent,
            token_expires_at: a.token_expires_at,
            expires_at: a.expires_at,
            consent_given_at: a.consent_given_at,
            revoked_at: a.revoked_at,
            resend_count: a.resend_count,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub requested_by: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
    pub revoked_by: String,
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
    }
}

/// POST /api/v1/authorizations
pub async fn create_authorization(
    State(state): State<AppState>,
    Json(request): Json<CreateAuthorizationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthorizationSummary>>), ApiError> {
    let authorization = state.consent.create_authorization(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(authorization.into())),
    ))
}

/// GET /api/v1/authorizations/:id
pub async fn get_authorization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AuthorizationSummary>>, ApiError> {
    let authorization = state
        .consent
        .get_authorization(id)
        .await?
        .ok_or_else(|| ApiError::not_found("authorization"))?;
    Ok(Json(ApiResponse::new(authorization.into())))
}

/// POST /api/v1/authorizations/:id/resend
pub async fn resend_authorization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResendRequest>,
) -> Result<Json<ApiResponse<AuthorizationSummary>>, ApiError> {
    let authorization = state.consent.resend(id, &request.requested_by).await?;
    Ok(Json(ApiResponse::new(authorization.into())))
}

/// POST /api/v1/authorizations/:id/revoke
pub async fn revoke_authorization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<ApiResponse<AuthorizationSummary>>, ApiError> {
    let authorization = state
        .consent
        .revoke(id, &request.reason, &request.revoked_by)
        .await?;
    Ok(Json(ApiResponse::new(authorization.into())))
}

/// GET /authorize/:token, loaded by the patient's link.
pub async fn view_authorization_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<AuthorizationView>>, ApiError> {
    let view = state
        .consent
        .view_by_token(&token, &client_info(&headers))
        .await?;
    Ok(Json(ApiResponse::new(view)))
}

/// POST /authorize/:token, the patient's decision.
pub async fn decide_authorization_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(decision): Json<ConsentDecision>,
) -> Result<Json<ApiResponse<AuthorizationSummary>>, ApiError> {
    let authorization = state
        .consent
        .decide_by_token(&token, decision, &client_info(&headers))
        .await?;
    Ok(Json(ApiResponse::new(authorization.into())))
}
