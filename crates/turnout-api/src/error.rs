//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use turnout_core::Error as CoreError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("precondition failed: {0}")]
  PreconditionFailed(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a store error by the domain error somewhere in its source
  /// chain. Anything else is an opaque 500.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let classified = find_core(&err).map(|core| {
      let message = core.to_string();
      match core {
        CoreError::StationNotFound(_)
        | CoreError::VoteNotFound(_)
        | CoreError::TallyNotFound(_) => Self::NotFound(message),
        CoreError::DuplicateStationNumber(_) => Self::Conflict(message),
        CoreError::VersionConflict { .. } => Self::PreconditionFailed(message),
        CoreError::InvalidCalendar(_)
        | CoreError::InvalidStationNumber(_)
        | CoreError::InvalidAssignment { .. }
        | CoreError::ParticipantNotFound(_) => Self::BadRequest(message),
      }
    });
    classified.unwrap_or_else(|| Self::Store(Box::new(err)))
  }
}

fn find_core<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a CoreError> {
  let mut current = Some(err);
  while let Some(e) = current {
    if let Some(core) = e.downcast_ref::<CoreError>() {
      return Some(core);
    }
    current = e.source();
  }
  None
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::PreconditionFailed(m) => (StatusCode::PRECONDITION_FAILED, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure while handling request");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
