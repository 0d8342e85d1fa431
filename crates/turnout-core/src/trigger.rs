//! Recalculation trigger: deciding which tallies a vote write touches.
//!
//! Vote writes produce [`VoteChanged`] events. Storage backends react to them
//! inside the write transaction by recalculating each affected station, then
//! publish a [`TallyEvent`] per recalculated tally once the transaction has
//! committed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  calendar::{Day, PollingCalendar},
  reconcile::DayChange,
  tally::DailyTally,
  vote::VoteRecord,
};

/// A vote write that may move a station's counts.
///
/// `day` is the polling day the record counted toward on that side of the
/// write, or `None` if it did not count for any day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteChanged {
  pub station_id: Uuid,
  pub day:        Option<Day>,
}

/// Events for a write that turns `before` into `after`.
///
/// `None` on either side means the record did not exist (create / delete).
/// Nothing is emitted when none of `station_id`, `confirmed` or `vote_date`
/// changed. A record moving between stations yields an event for each.
pub fn vote_changes(
  before: Option<&VoteRecord>,
  after: Option<&VoteRecord>,
  calendar: &PollingCalendar,
) -> Vec<VoteChanged> {
  if let (Some(b), Some(a)) = (before, after)
    && b.station_id == a.station_id
    && b.confirmed == a.confirmed
    && b.vote_date == a.vote_date
  {
    return Vec::new();
  }

  let mut events: Vec<VoteChanged> = Vec::with_capacity(2);
  for record in [before, after].into_iter().flatten() {
    let event =
      VoteChanged { station_id: record.station_id, day: record.counted_day(calendar) };
    if !events.contains(&event) {
      events.push(event);
    }
  }
  events
}

/// Distinct stations named by `events`, in first-seen order.
pub fn affected_stations(events: &[VoteChanged]) -> Vec<Uuid> {
  let mut out: Vec<Uuid> = Vec::with_capacity(events.len());
  for e in events {
    if !out.contains(&e.station_id) {
      out.push(e.station_id);
    }
  }
  out
}

// ─── Published events ────────────────────────────────────────────────────────

/// Why a tally was recalculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcCause {
  /// A vote record was created, updated or deleted.
  VoteWrite,
  /// An operator asked for it (single station or batch resync).
  Operator,
}

/// Published after a tally write commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TallyEvent {
  Recalculated {
    station_id: Uuid,
    version:    u64,
    cause:      RecalcCause,
  },
  Edited {
    station_id: Uuid,
    version:    u64,
  },
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// The result of a vote write, including every tally it recalculated.
#[derive(Debug, Clone, Serialize)]
pub struct VoteWrite {
  /// The record as written (or as it was, for a delete).
  pub vote:    VoteRecord,
  pub changes: Vec<VoteChanged>,
  pub tallies: Vec<DailyTally>,
}

/// The result of recalculating one station on request.
#[derive(Debug, Clone, Serialize)]
pub struct RecalcOutcome {
  pub station_id: Uuid,
  pub before:     DailyTally,
  /// The tally as committed, or as it would be for a dry run.
  pub after:      DailyTally,
  pub changes:    Vec<DayChange>,
  pub dry_run:    bool,
}

impl RecalcOutcome {
  pub fn changed(&self) -> bool { !self.changes.is_empty() }
}
