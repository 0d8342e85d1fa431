//! Handlers for `/reports` endpoints. All read-only projections.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/reports/summary` | System-wide plan vs fact |
//! | `GET`  | `/reports/stations` | One row per station, ordered by number |
//! | `GET`  | `/reports/leads` | Lead → station → canvasser rollup from vote records |

use axum::{Json, extract::State};
use turnout_core::{
  report::{LeadRollup, StationRow, SystemSummary, lead_rollups, station_rows, system_summary},
  store::TallyStore,
  vote::VoteQuery,
};

use crate::{ApiState, error::ApiError};

/// `GET /reports/summary`
pub async fn summary<S>(State(state): State<ApiState<S>>) -> Result<Json<SystemSummary>, ApiError>
where
  S: TallyStore,
{
  let tallies = state.store.list_tallies().await.map_err(ApiError::store)?;
  Ok(Json(system_summary(&tallies)))
}

/// `GET /reports/stations`
pub async fn stations<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<StationRow>>, ApiError>
where
  S: TallyStore,
{
  let stations = state.store.list_stations().await.map_err(ApiError::store)?;
  let tallies = state.store.list_tallies().await.map_err(ApiError::store)?;
  Ok(Json(station_rows(&stations, &tallies)))
}

/// `GET /reports/leads`
pub async fn leads<S>(State(state): State<ApiState<S>>) -> Result<Json<Vec<LeadRollup>>, ApiError>
where
  S: TallyStore,
{
  let stations = state.store.list_stations().await.map_err(ApiError::store)?;
  let votes = state.store.list_votes(&VoteQuery::default()).await.map_err(ApiError::store)?;
  Ok(Json(lead_rollups(&stations, &votes, state.store.calendar())))
}
