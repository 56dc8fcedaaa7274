//! HTTP API surface for the payer data broker.
//!
//! Exposes the consent lifecycle, brokered insurance-data access, credential
//! onboarding, and the audit trail over a single axum router.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::*;
pub use state::AppState;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Assemble the application router with shared middleware.
pub fn create_app(state: AppState) -> Router {
    routes::create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
