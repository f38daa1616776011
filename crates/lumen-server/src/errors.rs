//! API error responses.
//!
//! Handlers return [`ApiError`]; the `IntoResponse` impl maps each variant
//! to a status code with a JSON body. Status-polling clients always get a
//! well-formed payload — errors are data.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use lumen_store::StoreError;

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request parameter.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::FormationNotFound(id) | StoreError::JobNotFound(id) => Self::NotFound(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<lumen_export::ExportError> for ApiError {
    fn from(e: lumen_export::ExportError) -> Self {
        match e {
            lumen_export::ExportError::NoData(id) => {
                Self::BadRequest(format!("formation {id} has no exportable data"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
