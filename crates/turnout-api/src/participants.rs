//! Handlers for `/participants` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/participants` | Ordered by name |
//! | `POST` | `/participants` | Body: `{"full_name":"...","role":"canvasser\|lead\|both"}` |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use turnout_core::{
  station::{NewParticipant, Participant},
  store::TallyStore,
};

use crate::{ApiState, error::ApiError};

/// `GET /participants`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<Participant>>, ApiError>
where
  S: TallyStore,
{
  let participants = state.store.list_participants().await.map_err(ApiError::store)?;
  Ok(Json(participants))
}

/// `POST /participants`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewParticipant>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TallyStore,
{
  if body.full_name.trim().is_empty() {
    return Err(ApiError::BadRequest("full_name must not be empty".into()));
  }
  let participant = state.store.add_participant(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(participant)))
}
