//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Each variant of the core taxonomy maps to exactly one status code, so no
//! handler ever matches on message strings.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use mobistory_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Map the core taxonomy onto HTTP outcomes.
  pub fn from_core(e: CoreError) -> Self {
    use CoreError::*;
    match e {
      Validation { .. } => Self::BadRequest(e.to_string()),
      EntityNotFound(_) | VehicleNotFound(_) | LinkNotFound(_)
      | LinkRoleNotFound(_) | RecordNotFound { .. } => {
        Self::NotFound(e.to_string())
      },
      InvalidState { .. } | PartitionMissing { .. } => {
        Self::Unprocessable(e.to_string())
      },
      Conflict { .. } | DuplicateOwner { .. } => Self::Conflict(e.to_string()),
      PermissionDenied { .. } => Self::Forbidden(e.to_string()),
      Serialization(_) | Storage(_) => Self::Internal(e.to_string()),
    }
  }

  /// Convenience for store errors, which all collapse into the core
  /// taxonomy.
  pub fn from_store<E: Into<CoreError>>(e: E) -> Self {
    Self::from_core(e.into())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
