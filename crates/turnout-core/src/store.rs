//! The `TallyStore` trait.
//!
//! Implemented by storage backends (e.g. `turnout-store-sqlite`). Higher
//! layers (`turnout-api`, `turnout-server`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  calendar::PollingCalendar,
  station::{NewParticipant, NewStation, Participant, Station},
  tally::{DailyTally, TallyEdit},
  trigger::{RecalcOutcome, TallyEvent, VoteWrite},
  vote::{NewVote, VotePatch, VoteQuery, VoteRecord},
};

/// Abstraction over a turnout store backend.
///
/// Every vote write recalculates the affected tallies in the same
/// transaction as the write, so a read that follows a confirmation always
/// sees consistent totals.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait TallyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The polling dates this store counts votes against.
  fn calendar(&self) -> &PollingCalendar;

  /// Receive a [`TallyEvent`] for every committed tally write.
  fn subscribe(&self) -> broadcast::Receiver<TallyEvent>;

  // ── Stations ──────────────────────────────────────────────────────────

  /// Create a station together with its all-zero tally.
  fn add_station(
    &self,
    input: NewStation,
  ) -> impl Future<Output = Result<(Station, DailyTally), Self::Error>> + Send + '_;

  fn get_station(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Station>, Self::Error>> + Send + '_;

  /// Look a station up by its public UIK number.
  fn find_station(
    &self,
    number: u32,
  ) -> impl Future<Output = Result<Option<Station>, Self::Error>> + Send + '_;

  /// All stations ordered by number.
  fn list_stations(
    &self,
  ) -> impl Future<Output = Result<Vec<Station>, Self::Error>> + Send + '_;

  // ── Participants ──────────────────────────────────────────────────────

  fn add_participant(
    &self,
    input: NewParticipant,
  ) -> impl Future<Output = Result<Participant, Self::Error>> + Send + '_;

  fn list_participants(
    &self,
  ) -> impl Future<Output = Result<Vec<Participant>, Self::Error>> + Send + '_;

  // ── Votes (each write recalculates affected tallies) ──────────────────

  fn record_vote(
    &self,
    input: NewVote,
  ) -> impl Future<Output = Result<VoteWrite, Self::Error>> + Send + '_;

  fn update_vote(
    &self,
    voter_id: Uuid,
    patch: VotePatch,
  ) -> impl Future<Output = Result<VoteWrite, Self::Error>> + Send + '_;

  fn delete_vote(
    &self,
    voter_id: Uuid,
  ) -> impl Future<Output = Result<VoteWrite, Self::Error>> + Send + '_;

  fn get_vote(
    &self,
    voter_id: Uuid,
  ) -> impl Future<Output = Result<Option<VoteRecord>, Self::Error>> + Send + '_;

  fn list_votes<'a>(
    &'a self,
    query: &'a VoteQuery,
  ) -> impl Future<Output = Result<Vec<VoteRecord>, Self::Error>> + Send + 'a;

  // ── Tallies ───────────────────────────────────────────────────────────

  fn get_tally(
    &self,
    station_id: Uuid,
  ) -> impl Future<Output = Result<Option<DailyTally>, Self::Error>> + Send + '_;

  /// Every stored tally, including any whose station row has gone missing.
  fn list_tallies(
    &self,
  ) -> impl Future<Output = Result<Vec<DailyTally>, Self::Error>> + Send + '_;

  /// Apply an operator edit (plan, manual fact, lock).
  ///
  /// With `expected_version`, the edit fails with a version conflict unless
  /// the stored tally is still at that version.
  fn edit_tally(
    &self,
    station_id: Uuid,
    edit: TallyEdit,
    expected_version: Option<u64>,
  ) -> impl Future<Output = Result<DailyTally, Self::Error>> + Send + '_;

  /// Recalculate one station's tally from its vote records. Nothing is
  /// written when `dry_run` is set.
  fn recalculate(
    &self,
    station_id: Uuid,
    dry_run: bool,
  ) -> impl Future<Output = Result<RecalcOutcome, Self::Error>> + Send + '_;

  /// Create an all-zero tally for every station lacking one. Returns the
  /// number created.
  fn ensure_tallies(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
