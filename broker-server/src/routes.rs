use crate::handlers::{audit, consent, data, health};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        // Patient-facing authorization link
        .route(
            "/authorize/:token",
            get(consent::view_authorization_link).post(consent::decide_authorization_link),
        )
        // Practice-facing consent lifecycle
        .route(
            "/api/v1/authorizations",
            post(consent::create_authorization),
        )
        .route("/api/v1/authorizations/:id", get(consent::get_authorization))
        .route(
            "/api/v1/authorizations/:id/resend",
            post(consent::resend_authorization),
        )
        .route(
            "/api/v1/authorizations/:id/revoke",
            post(consent::revoke_authorization),
        )
        // Brokered data access
        .route("/api/v1/authorizations/:id/data", post(data::fetch_all_data))
        .route(
            "/api/v1/authorizations/:id/data/:scope",
            post(data::fetch_data),
        )
        .route(
            "/api/v1/patients/:patient_id/data/cached",
            get(data::get_cached_data),
        )
        .route(
            "/api/v1/patients/:patient_id/data/refresh",
            post(data::refresh_patient_data),
        )
        // Directory and credential onboarding
        .route("/api/v1/patients", post(data::register_patient))
        .route("/api/v1/practices", post(data::register_practice))
        .route(
            "/api/v1/practices/:practice_id/payers/:payer_code/credentials",
            put(data::store_credentials),
        )
        .route("/api/v1/payers/health", get(data::payer_health))
        // Audit surface
        .route("/api/v1/audit/events", get(audit::list_events))
        .route(
            "/api/v1/audit/disclosures/:resource_type/:resource_id",
            get(audit::list_disclosures),
        )
        .route("/api/v1/audit/verify", post(audit::verify_chain))
}
