//! Handlers for `/tallies` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/tallies` | All stored tallies |
//! | `GET`   | `/tallies/:station_id` | Sets `ETag` |
//! | `PATCH` | `/tallies/:station_id` | Body: [`TallyEdit`]; honours `If-Match` (412 on mismatch) |
//! | `POST`  | `/tallies/:station_id/recalculate` | `?dry_run=true` previews without writing |
//! | `POST`  | `/tallies/recalculate` | Batch resync of every tally; `?dry_run=true` |
//! | `POST`  | `/tallies/populate` | Create missing tallies; returns `{"created": n}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, header},
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use turnout_core::{
  Error as CoreError,
  resync::{ResyncOptions, ResyncReport, resync_all},
  store::TallyStore,
  tally::{DailyTally, TallyEdit},
  trigger::RecalcOutcome,
};
use uuid::Uuid;

use crate::{
  ApiState,
  error::ApiError,
  etag::{if_match, matches, tally_etag},
};

#[derive(Debug, Default, Deserialize)]
pub struct DryRun {
  #[serde(default)]
  pub dry_run: bool,
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /tallies`
pub async fn list<S>(State(state): State<ApiState<S>>) -> Result<Json<Vec<DailyTally>>, ApiError>
where
  S: TallyStore,
{
  let tallies = state.store.list_tallies().await.map_err(ApiError::store)?;
  Ok(Json(tallies))
}

async fn load<S>(store: &S, station_id: Uuid) -> Result<DailyTally, ApiError>
where
  S: TallyStore,
{
  store
    .get_tally(station_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(CoreError::TallyNotFound(station_id).to_string()))
}

/// `GET /tallies/:station_id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(station_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TallyStore,
{
  let tally = load(state.store.as_ref(), station_id).await?;
  Ok(([(header::ETAG, tally_etag(&tally))], Json(tally)))
}

// ─── Operator edit ────────────────────────────────────────────────────────────

/// `PATCH /tallies/:station_id`
///
/// With `If-Match`, the edit is only applied to the version the client saw;
/// a concurrent write in between yields 412.
pub async fn edit<S>(
  State(state): State<ApiState<S>>,
  Path(station_id): Path<Uuid>,
  headers: HeaderMap,
  Json(edit): Json<TallyEdit>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TallyStore,
{
  if edit.is_empty() {
    return Err(ApiError::BadRequest("edit names no days".into()));
  }

  let expected_version = match if_match(&headers) {
    Some(tag) => {
      let current = load(state.store.as_ref(), station_id).await?;
      if !matches(tag, &tally_etag(&current)) {
        return Err(ApiError::PreconditionFailed(format!(
          "tally for station {station_id} has changed"
        )));
      }
      Some(current.version)
    }
    None => None,
  };

  let tally = state
    .store
    .edit_tally(station_id, edit, expected_version)
    .await
    .map_err(ApiError::store)?;
  Ok(([(header::ETAG, tally_etag(&tally))], Json(tally)))
}

// ─── Recalculation ────────────────────────────────────────────────────────────

/// `POST /tallies/:station_id/recalculate[?dry_run=true]`
pub async fn recalculate_one<S>(
  State(state): State<ApiState<S>>,
  Path(station_id): Path<Uuid>,
  Query(params): Query<DryRun>,
) -> Result<Json<RecalcOutcome>, ApiError>
where
  S: TallyStore,
{
  let outcome = state
    .store
    .recalculate(station_id, params.dry_run)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}

/// `POST /tallies/recalculate[?dry_run=true]`
pub async fn recalculate_all<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<DryRun>,
) -> Result<Json<ResyncReport>, ApiError>
where
  S: TallyStore + 'static,
{
  let options = ResyncOptions { dry_run: params.dry_run, ..state.resync };
  let report = resync_all(Arc::clone(&state.store), options).await.map_err(ApiError::store)?;
  tracing::info!(
    dry_run = report.dry_run,
    succeeded = report.succeeded,
    changed = report.changed.len(),
    failed = report.failed.len(),
    "batch resync finished",
  );
  Ok(Json(report))
}

/// `POST /tallies/populate`
pub async fn populate<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: TallyStore,
{
  let created = state.store.ensure_tallies().await.map_err(ApiError::store)?;
  Ok(Json(json!({ "created": created })))
}
