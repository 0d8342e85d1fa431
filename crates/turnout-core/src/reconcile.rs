//! The reconciliation engine.
//!
//! Everything here is pure. Storage backends feed it counts through a
//! [`VoteCounter`] (their open transaction, typically) and persist the
//! resulting [`DailyComputation`] in a single write.

use std::convert::Infallible;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  calendar::{Day, PollingCalendar},
  tally::{DailyTally, Source},
  vote::VoteRecord,
};

// ─── Counting ────────────────────────────────────────────────────────────────

/// Anything that can count confirmed votes for a station on a date.
pub trait VoteCounter {
  type Error;

  /// Number of records with `station_id == station_id`, `confirmed == true`
  /// and `vote_date == date`.
  fn count_confirmed(&self, station_id: Uuid, date: NaiveDate) -> Result<u32, Self::Error>;
}

impl VoteCounter for [VoteRecord] {
  type Error = Infallible;

  fn count_confirmed(&self, station_id: Uuid, date: NaiveDate) -> Result<u32, Infallible> {
    let n = self
      .iter()
      .filter(|v| v.station_id == station_id && v.confirmed && v.vote_date == Some(date))
      .count();
    Ok(u32::try_from(n).unwrap_or(u32::MAX))
  }
}

/// Confirmed vote counts for the three polling days, indexed by [`Day::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyCounts(pub [u32; 3]);

impl DailyCounts {
  pub fn get(&self, day: Day) -> u32 { self.0[day.index()] }
}

/// Count confirmed votes for `station_id` on each of the calendar's dates.
///
/// Only the three known dates are ever queried, so records dated elsewhere
/// simply never show up.
pub fn compute_daily_counts<C>(
  counter: &C,
  station_id: Uuid,
  calendar: &PollingCalendar,
) -> Result<DailyCounts, C::Error>
where
  C: VoteCounter + ?Sized,
{
  let mut counts = [0; 3];
  for (day, date) in calendar.iter() {
    counts[day.index()] = counter.count_confirmed(station_id, date)?;
  }
  Ok(DailyCounts(counts))
}

// ─── Merging ─────────────────────────────────────────────────────────────────

/// The result of reconciling one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayMerge {
  pub effective:  u32,
  pub new_manual: u32,
  pub source:     Source,
}

/// Reconcile the manual and computed values for one day.
///
/// A locked day keeps its manual value. An unlocked day ratchets the manual
/// value up to the computed one; the label is `calculated` whenever the
/// computed value is at least the manual one, so a tie reads `calculated`
/// even though the value is the same either way.
pub fn merge_day(manual: u32, computed: u32, locked: bool) -> DayMerge {
  let new_manual = if locked { manual } else { manual.max(computed) };
  DayMerge {
    effective: new_manual,
    new_manual,
    source: Source::label(manual, computed, locked),
  }
}

// ─── DailyComputation ────────────────────────────────────────────────────────

/// Engine-owned values for one day after a recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOutcome {
  pub computed_fact: u32,
  pub manual_fact:   u32,
  pub source:        Source,
}

/// The immutable result of recalculating a tally; applied in one write via
/// [`DailyTally::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyComputation {
  pub station_id: Uuid,
  pub days:       [DayOutcome; 3],
}

impl DailyComputation {
  pub fn day(&self, day: Day) -> &DayOutcome { &self.days[day.index()] }

  /// Per-day differences between `tally` and this computation.
  pub fn changes(&self, tally: &DailyTally) -> Vec<DayChange> {
    Day::ALL
      .into_iter()
      .filter_map(|day| {
        let before = tally.day(day);
        let after = self.day(day);
        let unchanged = before.computed_fact == after.computed_fact
          && before.manual_fact == after.manual_fact
          && before.source == after.source;
        (!unchanged).then_some(DayChange {
          day,
          computed_before: before.computed_fact,
          computed_after: after.computed_fact,
          manual_before: before.manual_fact,
          manual_after: after.manual_fact,
          source_before: before.source,
          source_after: after.source,
        })
      })
      .collect()
  }
}

/// One day's worth of difference, for reporting dry runs and batch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayChange {
  pub day:             Day,
  pub computed_before: u32,
  pub computed_after:  u32,
  pub manual_before:   u32,
  pub manual_after:    u32,
  pub source_before:   Source,
  pub source_after:    Source,
}

/// Recalculate `tally` against fresh `counts`.
///
/// `computed_fact` is replaced on every day, locked or not. Manual values
/// and labels go through [`merge_day`].
pub fn recalculate(tally: &DailyTally, counts: DailyCounts) -> DailyComputation {
  let days = Day::ALL.map(|day| {
    let current = tally.day(day);
    let computed = counts.get(day);
    let merged = merge_day(current.manual_fact, computed, current.locked);
    DayOutcome { computed_fact: computed, manual_fact: merged.new_manual, source: merged.source }
  });
  DailyComputation { station_id: tally.station_id, days }
}
