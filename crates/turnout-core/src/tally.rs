//! The per-station daily tally.
//!
//! A tally holds, for each of the three polling days, the operator's plan and
//! two fact values from independent sources: `manual_fact` (entered by
//! operators, ratcheted upward by the engine) and `computed_fact` (owned by
//! the engine, derived from confirmed vote records). A per-day lock freezes
//! the day to its manual value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{calendar::Day, reconcile::DailyComputation};

// ─── Source ──────────────────────────────────────────────────────────────────

/// Which side the effective value of a day currently tracks.
///
/// Two states, one transition rule: see [`crate::reconcile::merge_day`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  #[default]
  Manual,
  Calculated,
}

impl Source {
  /// Derive the label for a day.
  ///
  /// Locked days are always manual. Otherwise the computed side owns the day
  /// whenever it is at least the manual value, ties included.
  pub fn label(manual: u32, computed: u32, locked: bool) -> Self {
    if !locked && computed >= manual {
      Self::Calculated
    } else {
      Self::Manual
    }
  }
}

// ─── DayTally ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayTally {
  pub plan:          u32,
  pub manual_fact:   u32,
  pub computed_fact: u32,
  pub locked:        bool,
  pub source:        Source,
}

impl DayTally {
  /// The value used in every report for this day.
  pub fn effective_fact(&self) -> u32 {
    if self.locked {
      self.manual_fact
    } else {
      self.manual_fact.max(self.computed_fact)
    }
  }

  pub fn execution_pct(&self) -> f64 {
    percent(self.effective_fact().into(), self.plan.into())
  }
}

// ─── DailyTally ──────────────────────────────────────────────────────────────

/// The aggregate record for one station. Always exists for every station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTally {
  pub station_id: Uuid,
  /// Indexed by [`Day::index`].
  pub days:       [DayTally; 3],
  /// Incremented on every committed write.
  pub version:    u64,
  pub updated_at: DateTime<Utc>,
}

impl DailyTally {
  /// A fresh all-zero, unlocked tally.
  pub fn new(station_id: Uuid, at: DateTime<Utc>) -> Self {
    Self { station_id, days: [DayTally::default(); 3], version: 0, updated_at: at }
  }

  pub fn day(&self, day: Day) -> &DayTally { &self.days[day.index()] }

  pub fn day_mut(&mut self, day: Day) -> &mut DayTally { &mut self.days[day.index()] }

  pub fn effective_fact(&self, day: Day) -> u32 { self.day(day).effective_fact() }

  /// Summed in `u64`: three `u32` days can exceed `u32::MAX`.
  pub fn total_plan(&self) -> u64 { self.days.iter().map(|d| u64::from(d.plan)).sum() }

  pub fn total_fact(&self) -> u64 { self.days.iter().map(|d| u64::from(d.effective_fact())).sum() }

  /// `100 · total_fact / total_plan`, or 0 when nothing is planned.
  pub fn execution_pct(&self) -> f64 { percent(self.total_fact(), self.total_plan()) }

  /// Commit the engine-owned fields of a computation. Plan and lock flags
  /// are untouched.
  pub fn apply(&mut self, computation: &DailyComputation) {
    for day in Day::ALL {
      let outcome = computation.day(day);
      let slot = self.day_mut(day);
      slot.computed_fact = outcome.computed_fact;
      slot.manual_fact = outcome.manual_fact;
      slot.source = outcome.source;
    }
  }

  /// Apply an operator edit. The source label is re-derived against the
  /// stored computed value; no ratcheting happens here.
  pub fn apply_edit(&mut self, edit: &TallyEdit) {
    for (day, change) in &edit.days {
      let slot = self.day_mut(*day);
      if let Some(plan) = change.plan {
        slot.plan = plan;
      }
      if let Some(manual) = change.manual_fact {
        slot.manual_fact = manual;
      }
      if let Some(locked) = change.locked {
        slot.locked = locked;
      }
      slot.source = Source::label(slot.manual_fact, slot.computed_fact, slot.locked);
    }
  }
}

/// `100 · part / whole`, or 0 when `whole` is zero.
pub fn percent(part: u64, whole: u64) -> f64 {
  if whole == 0 {
    0.0
  } else {
    100.0 * part as f64 / whole as f64
  }
}

// ─── Operator edits ──────────────────────────────────────────────────────────

/// Operator-settable fields for one day. `None` leaves a field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayEdit {
  #[serde(default)]
  pub plan:        Option<u32>,
  #[serde(default)]
  pub manual_fact: Option<u32>,
  #[serde(default)]
  pub locked:      Option<bool>,
}

/// Input to [`crate::store::TallyStore::edit_tally`], e.g.
/// `{"days": {"first": {"plan": 10, "locked": true}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEdit {
  #[serde(default)]
  pub days: BTreeMap<Day, DayEdit>,
}

impl TallyEdit {
  pub fn day(mut self, day: Day, edit: DayEdit) -> Self {
    self.days.insert(day, edit);
    self
  }

  pub fn is_empty(&self) -> bool { self.days.is_empty() }
}
