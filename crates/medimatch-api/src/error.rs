//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  /// A catalog conflict or a rebuild that is already running.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Engine(#[source] medimatch_engine::Error),
}

impl From<medimatch_engine::Error> for ApiError {
  fn from(e: medimatch_engine::Error) -> Self {
    use medimatch_engine::Error as EngineError;

    match e {
      EngineError::AmbiguousSideEffect { .. } => ApiError::BadRequest(e.to_string()),
      EngineError::BuildInProgress => ApiError::Conflict(e.to_string()),
      e if e.is_conflict() => ApiError::Conflict(e.to_string()),
      e => ApiError::Engine(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Engine(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
