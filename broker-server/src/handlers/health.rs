use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, response::Json};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub uptime_seconds: i64,
    pub checks: HashMap<String, String>,
}

/// Liveness plus an audit-chain spot check.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let mut checks = HashMap::new();

    let report = state.audit.verify_integrity().await?;
    checks.insert(
        "audit_chain".to_string(),
        if report.valid {
            format!("ok ({} records)", report.records_checked)
        } else {
            "broken".to_string()
        },
    );

    let status = if report.valid { "healthy" } else { "degraded" };
    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        checks,
    }))
}
