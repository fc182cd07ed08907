// src/server/mod.rs

//! HTTP surface for certsync.
//!
//! This module contains:
//! - `handlers` → Axum handlers for health, verification and submissions
//! - `routes`   → Router builder
//!
//! Everything here is a thin shell over [`crate::manager::DataManager`]; no
//! business rules live in the handlers.

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, submit_application_handler, submit_contact_handler, verify_license_handler,
    AppState, SubmissionResponse, VerifyResponse,
};
pub use routes::build_router;
