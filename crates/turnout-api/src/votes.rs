//! Handlers for `/votes` endpoints.
//!
//! Every write responds with a [`VoteWrite`]: the record, the change events
//! it produced, and the tallies recalculated in the same transaction.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/votes` | Optional `station_id`, `canvasser_id`, `confirmed` |
//! | `POST`   | `/votes` | Body: [`NewVote`]; returns 201 |
//! | `GET`    | `/votes/:id` | 404 if not found |
//! | `PATCH`  | `/votes/:id` | Body: [`VotePatch`]; `null` clears a nullable field |
//! | `DELETE` | `/votes/:id` | Returns the deleted record |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use turnout_core::{
  store::TallyStore,
  trigger::VoteWrite,
  vote::{NewVote, VotePatch, VoteQuery, VoteRecord},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /votes[?station_id=..][&canvasser_id=..][&confirmed=true|false]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(query): Query<VoteQuery>,
) -> Result<Json<Vec<VoteRecord>>, ApiError>
where
  S: TallyStore,
{
  let votes = state.store.list_votes(&query).await.map_err(ApiError::store)?;
  Ok(Json(votes))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /votes/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<VoteRecord>, ApiError>
where
  S: TallyStore,
{
  let vote = state
    .store
    .get_vote(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("vote record {id} not found")))?;
  Ok(Json(vote))
}

// ─── Writes ───────────────────────────────────────────────────────────────────

/// `POST /votes`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewVote>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TallyStore,
{
  let write = state.store.record_vote(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(write)))
}

/// `PATCH /votes/:id`
pub async fn update<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<VotePatch>,
) -> Result<Json<VoteWrite>, ApiError>
where
  S: TallyStore,
{
  let write = state.store.update_vote(id, patch).await.map_err(ApiError::store)?;
  Ok(Json(write))
}

/// `DELETE /votes/:id`
pub async fn remove<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<VoteWrite>, ApiError>
where
  S: TallyStore,
{
  let write = state.store.delete_vote(id).await.map_err(ApiError::store)?;
  Ok(Json(write))
}
