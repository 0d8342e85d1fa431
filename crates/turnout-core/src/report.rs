//! Reporting projections: read-only rollups for dashboards.
//!
//! All functions are pure over values already read from a store. Percentages
//! are rounded to one decimal place; a zero plan always reports 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  calendar::{Day, PollingCalendar},
  station::Station,
  tally::{DailyTally, percent},
  vote::VoteRecord,
};

/// Round to one decimal place, as every report displays it.
pub fn round1(x: f64) -> f64 { (x * 10.0).round() / 10.0 }

fn pct(fact: u64, plan: u64) -> f64 { round1(percent(fact, plan)) }

// ─── Execution band ──────────────────────────────────────────────────────────

/// How far along a station (or the whole campaign) is against its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBand {
  /// Nothing planned; the percentage is meaningless.
  NoPlan,
  /// At or above 100 %.
  Complete,
  /// 80 % and up.
  OnTrack,
  /// 60 % and up.
  Lagging,
  Critical,
}

impl ExecutionBand {
  pub fn classify(plan: u64, execution_pct: f64) -> Self {
    if plan == 0 {
      Self::NoPlan
    } else if execution_pct >= 100.0 {
      Self::Complete
    } else if execution_pct >= 80.0 {
      Self::OnTrack
    } else if execution_pct >= 60.0 {
      Self::Lagging
    } else {
      Self::Critical
    }
  }
}

// ─── System summary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
  pub day:           Day,
  pub plan:          u64,
  pub fact:          u64,
  pub execution_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
  /// Number of tallies summed. A tally whose station row is gone still
  /// counts here, though [`station_rows`] leaves it out.
  pub station_count:      usize,
  /// Stations with a plan that is at least fully met.
  pub completed_stations: usize,
  pub total_plan:         u64,
  pub total_fact:         u64,
  pub execution_pct:      f64,
  pub days:               Vec<DaySummary>,
}

/// Campaign-wide totals across `tallies`.
pub fn system_summary(tallies: &[DailyTally]) -> SystemSummary {
  let total_plan: u64 = tallies.iter().map(DailyTally::total_plan).sum();
  let total_fact: u64 = tallies.iter().map(DailyTally::total_fact).sum();
  let completed_stations = tallies
    .iter()
    .filter(|t| t.total_plan() > 0 && t.execution_pct() >= 100.0)
    .count();

  let days = Day::ALL
    .into_iter()
    .map(|day| {
      let plan = tallies.iter().map(|t| u64::from(t.day(day).plan)).sum();
      let fact = tallies.iter().map(|t| u64::from(t.effective_fact(day))).sum();
      DaySummary { day, plan, fact, execution_pct: pct(fact, plan) }
    })
    .collect();

  SystemSummary {
    station_count: tallies.len(),
    completed_stations,
    total_plan,
    total_fact,
    execution_pct: pct(total_fact, total_plan),
    days,
  }
}

// ─── Station rows ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRow {
  pub station_id:    Uuid,
  pub number:        u32,
  pub total_plan:    u64,
  pub total_fact:    u64,
  pub execution_pct: f64,
  pub band:          ExecutionBand,
  pub days:          Vec<DaySummary>,
}

/// One row per station, ordered by station number.
///
/// A station without a tally reports as all zeros; a tally without a station
/// is left out.
pub fn station_rows(stations: &[Station], tallies: &[DailyTally]) -> Vec<StationRow> {
  let by_station: BTreeMap<Uuid, &DailyTally> =
    tallies.iter().map(|t| (t.station_id, t)).collect();

  let mut rows: Vec<StationRow> = stations
    .iter()
    .map(|station| {
      let fallback;
      let tally = match by_station.get(&station.station_id) {
        Some(t) => *t,
        None => {
          fallback = DailyTally::new(station.station_id, station.created_at);
          &fallback
        }
      };
      let execution_pct = round1(tally.execution_pct());
      StationRow {
        station_id: station.station_id,
        number: station.number,
        total_plan: tally.total_plan(),
        total_fact: tally.total_fact(),
        execution_pct,
        band: ExecutionBand::classify(tally.total_plan(), execution_pct),
        days: Day::ALL
          .into_iter()
          .map(|day| {
            let d = tally.day(day);
            DaySummary {
              day,
              plan: d.plan.into(),
              fact: d.effective_fact().into(),
              execution_pct: pct(d.effective_fact().into(), d.plan.into()),
            }
          })
          .collect(),
      }
    })
    .collect();

  rows.sort_by_key(|r| r.number);
  rows
}

// ─── Lead / canvasser rollup ─────────────────────────────────────────────────

/// Work done by one canvasser at one station, counted straight from vote
/// records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasserRollup {
  /// `None` collects records with no canvasser assigned.
  pub canvasser_id:  Option<Uuid>,
  /// Number of planned voters (vote records) assigned.
  pub plan:          u64,
  /// Confirmed votes per polling day, indexed by [`Day::index`].
  pub facts:         [u64; 3],
  pub total_fact:    u64,
  pub execution_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationBreakdown {
  pub station_id:    Uuid,
  pub number:        u32,
  pub plan:          u64,
  pub total_fact:    u64,
  pub execution_pct: f64,
  pub canvassers:    Vec<CanvasserRollup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRollup {
  /// `None` collects stations with no lead assigned.
  pub lead_id:       Option<Uuid>,
  pub plan:          u64,
  pub total_fact:    u64,
  pub execution_pct: f64,
  pub stations:      Vec<StationBreakdown>,
}

#[derive(Default)]
struct Acc {
  plan:  u64,
  facts: [u64; 3],
}

impl Acc {
  fn add(&mut self, record: &VoteRecord, calendar: &PollingCalendar) {
    self.plan += 1;
    if let Some(day) = record.counted_day(calendar) {
      self.facts[day.index()] += 1;
    }
  }

  fn total(&self) -> u64 { self.facts.iter().sum() }
}

/// Group stations by lead and, within each station, vote records by
/// canvasser.
///
/// This recounts from vote records instead of reading tallies, so manual
/// facts entered by operators do not appear here.
pub fn lead_rollups(
  stations: &[Station],
  votes: &[VoteRecord],
  calendar: &PollingCalendar,
) -> Vec<LeadRollup> {
  let mut per_station: BTreeMap<Uuid, BTreeMap<Option<Uuid>, Acc>> = BTreeMap::new();
  for v in votes {
    per_station
      .entry(v.station_id)
      .or_default()
      .entry(v.canvasser_id)
      .or_default()
      .add(v, calendar);
  }

  let mut by_lead: BTreeMap<Option<Uuid>, Vec<StationBreakdown>> = BTreeMap::new();
  for station in stations {
    let canvassers: Vec<CanvasserRollup> = per_station
      .remove(&station.station_id)
      .unwrap_or_default()
      .into_iter()
      .map(|(canvasser_id, acc)| CanvasserRollup {
        canvasser_id,
        plan: acc.plan,
        facts: acc.facts,
        total_fact: acc.total(),
        execution_pct: pct(acc.total(), acc.plan),
      })
      .collect();
    let plan = canvassers.iter().map(|c| c.plan).sum();
    let total_fact = canvassers.iter().map(|c| c.total_fact).sum();
    by_lead.entry(station.lead_id).or_default().push(StationBreakdown {
      station_id: station.station_id,
      number: station.number,
      plan,
      total_fact,
      execution_pct: pct(total_fact, plan),
      canvassers,
    });
  }

  by_lead
    .into_iter()
    .map(|(lead_id, mut stations)| {
      stations.sort_by_key(|s| s.number);
      let plan = stations.iter().map(|s| s.plan).sum();
      let total_fact = stations.iter().map(|s| s.total_fact).sum();
      LeadRollup { lead_id, plan, total_fact, execution_pct: pct(total_fact, plan), stations }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, Utc};

  use super::*;
  use crate::tally::DayTally;

  fn date(n: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 9, n).unwrap() }

  fn calendar() -> PollingCalendar { PollingCalendar::new([date(12), date(13), date(14)]).unwrap() }

  fn station(number: u32, lead_id: Option<Uuid>) -> Station {
    Station {
      station_id: Uuid::new_v4(),
      number,
      address: format!("Station {number}"),
      lead_id,
      created_at: Utc::now(),
    }
  }

  fn tally(station_id: Uuid, plans: [u32; 3], manuals: [u32; 3]) -> DailyTally {
    let mut t = DailyTally::new(station_id, Utc::now());
    for ((slot, plan), manual) in t.days.iter_mut().zip(plans).zip(manuals) {
      *slot = DayTally { plan, manual_fact: manual, ..DayTally::default() };
    }
    t
  }

  fn vote(station_id: Uuid, canvasser: Option<Uuid>, confirmed: bool, on: Option<u32>) -> VoteRecord {
    VoteRecord {
      voter_id: Uuid::new_v4(),
      station_id,
      canvasser_id: canvasser,
      confirmed,
      vote_date: on.map(date),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn summary_sums_effective_facts_per_day() {
    let a = tally(Uuid::new_v4(), [10, 10, 10], [4, 0, 0]);
    let b = tally(Uuid::new_v4(), [5, 5, 0], [5, 5, 0]);
    let s = system_summary(&[a, b]);

    assert_eq!(s.station_count, 2);
    assert_eq!(s.completed_stations, 1);
    assert_eq!(s.total_plan, 40);
    assert_eq!(s.total_fact, 14);
    assert_eq!(s.execution_pct, 35.0);
    assert_eq!(s.days[0].plan, 15);
    assert_eq!(s.days[0].fact, 9);
    assert_eq!(s.days[0].execution_pct, 60.0);
    assert_eq!(s.days[2].execution_pct, 0.0);
  }

  #[test]
  fn summary_keeps_orphan_tallies_that_rows_drop() {
    let kept = station(1, None);
    let tallies = [
      tally(kept.station_id, [10, 0, 0], [5, 0, 0]),
      tally(Uuid::new_v4(), [10, 0, 0], [10, 0, 0]),
    ];

    let s = system_summary(&tallies);
    assert_eq!(s.station_count, 2);
    assert_eq!(s.total_fact, 15);

    let rows = station_rows(&[kept], &tallies);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_fact, 5);
  }

  #[test]
  fn summary_totals_past_u32_max() {
    let a = tally(Uuid::new_v4(), [3_000_000_000, 0, 0], [3_000_000_000, 0, 0]);
    let b = tally(Uuid::new_v4(), [3_000_000_000, 0, 0], [0, 0, 0]);
    let s = system_summary(&[a, b]);

    assert_eq!(s.total_plan, 6_000_000_000);
    assert_eq!(s.days[0].plan, 6_000_000_000);
    assert_eq!(s.total_fact, 3_000_000_000);
    assert_eq!(s.execution_pct, 50.0);
    assert_eq!(s.completed_stations, 1);
  }

  #[test]
  fn empty_summary_is_all_zero() {
    let s = system_summary(&[]);
    assert_eq!(s.total_plan, 0);
    assert_eq!(s.execution_pct, 0.0);
    assert!(s.days.iter().all(|d| d.execution_pct == 0.0));
  }

  #[test]
  fn rows_round_and_band() {
    let s1 = station(7, None);
    let s2 = station(3, None);
    let s3 = station(5, None);
    let tallies = [
      tally(s1.station_id, [10, 10, 10], [4, 0, 0]),
      tally(s2.station_id, [0, 0, 0], [2, 0, 0]),
    ];
    let rows = station_rows(&[s1, s2, s3], &tallies);

    assert_eq!(rows.iter().map(|r| r.number).collect::<Vec<_>>(), vec![3, 5, 7]);
    assert_eq!(rows[0].band, ExecutionBand::NoPlan);
    assert_eq!(rows[0].execution_pct, 0.0);
    assert_eq!(rows[1].total_plan, 0);
    assert_eq!(rows[2].execution_pct, 13.3);
    assert_eq!(rows[2].band, ExecutionBand::Critical);
    assert_eq!(rows[2].days[0].execution_pct, 40.0);
  }

  #[test]
  fn band_thresholds() {
    assert_eq!(ExecutionBand::classify(10, 100.0), ExecutionBand::Complete);
    assert_eq!(ExecutionBand::classify(10, 80.0), ExecutionBand::OnTrack);
    assert_eq!(ExecutionBand::classify(10, 79.9), ExecutionBand::Lagging);
    assert_eq!(ExecutionBand::classify(10, 59.9), ExecutionBand::Critical);
    assert_eq!(ExecutionBand::classify(0, 250.0), ExecutionBand::NoPlan);
  }

  #[test]
  fn lead_rollup_groups_by_lead_then_canvasser() {
    let cal = calendar();
    let lead = Uuid::new_v4();
    let c1 = Uuid::new_v4();
    let s1 = station(1, Some(lead));
    let s2 = station(2, Some(lead));
    let s3 = station(3, None);
    let votes = vec![
      vote(s1.station_id, Some(c1), true, Some(12)),
      vote(s1.station_id, Some(c1), true, Some(13)),
      vote(s1.station_id, Some(c1), false, Some(13)),
      vote(s1.station_id, None, true, Some(30)),
      vote(s2.station_id, Some(c1), false, None),
      vote(s3.station_id, None, true, Some(14)),
    ];
    let rollups = lead_rollups(&[s1.clone(), s2, s3], &votes, &cal);

    assert_eq!(rollups.len(), 2);
    let unassigned = rollups.iter().find(|r| r.lead_id.is_none()).unwrap();
    assert_eq!(unassigned.stations.len(), 1);
    assert_eq!(unassigned.total_fact, 1);

    let led = rollups.iter().find(|r| r.lead_id == Some(lead)).unwrap();
    assert_eq!(led.plan, 5);
    assert_eq!(led.total_fact, 2);
    assert_eq!(led.execution_pct, 40.0);

    let first = &led.stations[0];
    assert_eq!(first.station_id, s1.station_id);
    let c1_row = first.canvassers.iter().find(|c| c.canvasser_id == Some(c1)).unwrap();
    assert_eq!(c1_row.plan, 3);
    assert_eq!(c1_row.facts, [1, 1, 0]);
    let nobody = first.canvassers.iter().find(|c| c.canvasser_id.is_none()).unwrap();
    assert_eq!(nobody.total_fact, 0);

    let second = &led.stations[1];
    assert_eq!(second.plan, 1);
    assert_eq!(second.execution_pct, 0.0);
  }

  #[test]
  fn station_without_votes_has_zero_pct() {
    let rollups = lead_rollups(&[station(9, None)], &[], &calendar());
    assert_eq!(rollups[0].stations[0].plan, 0);
    assert_eq!(rollups[0].execution_pct, 0.0);
  }
}
