//! Handlers for `/stations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/stations` | Ordered by number |
//! | `POST` | `/stations` | Body: `{"number":101,"address":"...","lead_id":null}`; 409 on a taken number |
//! | `GET`  | `/stations/:id` | 404 if not found |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Serialize;
use turnout_core::{
  station::{NewStation, Station},
  store::TallyStore,
  tally::DailyTally,
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /stations`
pub async fn list<S>(State(state): State<ApiState<S>>) -> Result<Json<Vec<Station>>, ApiError>
where
  S: TallyStore,
{
  let stations = state.store.list_stations().await.map_err(ApiError::store)?;
  Ok(Json(stations))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// Response body for `POST /stations`: the station and its fresh tally.
#[derive(Debug, Serialize)]
pub struct Created {
  pub station: Station,
  pub tally:   DailyTally,
}

/// `POST /stations`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewStation>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TallyStore,
{
  if body.address.trim().is_empty() {
    return Err(ApiError::BadRequest("address must not be empty".into()));
  }
  let (station, tally) = state.store.add_station(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(Created { station, tally })))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /stations/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Station>, ApiError>
where
  S: TallyStore,
{
  let station = state
    .store
    .get_station(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("station {id} not found")))?;
  Ok(Json(station))
}
