//! JSON REST API for turnout.
//!
//! Exposes an axum [`Router`] backed by any
//! [`turnout_core::store::TallyStore`]. Auth, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", turnout_api::api_router(store.clone(), ResyncOptions::default()))
//! ```

pub mod error;
pub mod etag;
pub mod participants;
pub mod reports;
pub mod stations;
pub mod tallies;
pub mod votes;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use turnout_core::{resync::ResyncOptions, store::TallyStore};

pub use error::ApiError;

/// Shared state threaded through all API handlers.
pub struct ApiState<S> {
  pub store:  Arc<S>,
  /// Defaults for `POST /tallies/recalculate`; `dry_run` comes from the
  /// request.
  pub resync: ResyncOptions,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), resync: self.resync } }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, resync: ResyncOptions) -> Router<()>
where
  S: TallyStore + 'static,
{
  Router::new()
    // Stations
    .route("/stations", get(stations::list::<S>).post(stations::create::<S>))
    .route("/stations/{id}", get(stations::get_one::<S>))
    // Participants
    .route("/participants", get(participants::list::<S>).post(participants::create::<S>))
    // Votes
    .route("/votes", get(votes::list::<S>).post(votes::create::<S>))
    .route(
      "/votes/{id}",
      get(votes::get_one::<S>).patch(votes::update::<S>).delete(votes::remove::<S>),
    )
    // Tallies
    .route("/tallies", get(tallies::list::<S>))
    .route("/tallies/recalculate", post(tallies::recalculate_all::<S>))
    .route("/tallies/populate", post(tallies::populate::<S>))
    .route("/tallies/{station_id}", get(tallies::get_one::<S>).patch(tallies::edit::<S>))
    .route("/tallies/{station_id}/recalculate", post(tallies::recalculate_one::<S>))
    // Reports
    .route("/reports/summary", get(reports::summary::<S>))
    .route("/reports/stations", get(reports::stations::<S>))
    .route("/reports/leads", get(reports::leads::<S>))
    .with_state(ApiState { store, resync })
}
