use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::errors::{SyncError, SyncResult};
use crate::manager::DataManager;
use crate::models::{License, NewApplication, NewContact};
use crate::validation;

/// Shared application state for handlers.
///
/// Right now this only wraps the facade, but later you can add:
/// config, metrics handles, etc. without touching every handler signature.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DataManager>,
}

/// Standard error response body for HTTP errors.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Map internal SyncError into an HTTP response Axum understands.
///
/// This lets handlers return:
///   Result<Json<T>, SyncError>
/// and Axum will convert both success and error into HTTP responses.
impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match self {
            SyncError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::TransportError(_) => StatusCode::BAD_GATEWAY,
            SyncError::StorageError(_)
            | SyncError::EncryptionError(_)
            | SyncError::DecryptionError(_)
            | SyncError::SerializationError(_)
            | SyncError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Response for the public verification endpoint. Either the full active
/// license or a 404; no partial states.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub license: License,
}

/// Response for public submissions (applications, contacts).
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub id: uuid::Uuid,
}

/// Request body for a public contact submission.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

/// `GET /api/v1/health`
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let mut body = state.manager.health();
    body["status"] = json!("ok");
    Json(body)
}

/// `GET /api/v1/licenses/verify/{code}`
///
/// Public verification: returns the full license when it exists and is
/// active, 404 otherwise. The facade maps lookup failures to not-found,
/// so this endpoint never leaks backend state.
pub async fn verify_license_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> SyncResult<Json<VerifyResponse>> {
    validation::validate_license_code(&code, "license_code")?;

    match state.manager.verify_license(&code).await {
        Some(license) => {
            info!(%code, "License verified");
            Ok(Json(VerifyResponse {
                success: true,
                license,
            }))
        }
        None => Err(SyncError::NotFound(format!("no active license '{code}'"))),
    }
}

/// `POST /api/v1/applications`
pub async fn submit_application_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewApplication>,
) -> SyncResult<(StatusCode, Json<SubmissionResponse>)> {
    validation::validate_not_empty(&payload.name, "name")?;
    validation::validate_email(&payload.email, "email")?;
    validation::validate_category_number(&payload.category, "category")?;

    let application = state
        .manager
        .submit_application(payload)
        .await
        .ok_or_else(|| SyncError::TransportError("submission could not be stored".to_string()))?;

    info!(id = %application.id, "Application submitted");
    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            success: true,
            id: application.id,
        }),
    ))
}

/// `POST /api/v1/contacts`
pub async fn submit_contact_handler(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> SyncResult<(StatusCode, Json<SubmissionResponse>)> {
    validation::validate_not_empty(&payload.name, "name")?;
    validation::validate_email(&payload.email, "email")?;
    validation::validate_length(&payload.message, 1, 5000, "message")?;

    let contact = state
        .manager
        .add_contact(NewContact {
            name: payload.name,
            email: payload.email,
            subject: payload.subject,
            message: payload.message,
        })
        .await
        .ok_or_else(|| SyncError::TransportError("submission could not be stored".to_string()))?;

    info!(id = %contact.id, "Contact message received");
    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            success: true,
            id: contact.id,
        }),
    ))
}
