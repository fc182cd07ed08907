use axum::{
    routing::{get, post},
    Router,
};

use crate::server::handlers::{
    health_handler, submit_application_handler, submit_contact_handler, verify_license_handler,
    AppState,
};

/// Build the main application router for the certsync server.
///
/// This is a convenience helper so `main.rs` or tests can
/// construct the router in a single call.
///
/// # Routes
///
/// - `GET /api/v1/health` - Liveness and component status
/// - `GET /api/v1/licenses/verify/:code` - Public license verification
/// - `POST /api/v1/applications` - Public application submission
/// - `POST /api/v1/contacts` - Public contact submission
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/licenses/verify/:code",
            get(verify_license_handler),
        )
        .route("/api/v1/applications", post(submit_application_handler))
        .route("/api/v1/contacts", post(submit_contact_handler))
        .with_state(state)
}
