//! The three polling days and the calendar dates they fall on.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Day ─────────────────────────────────────────────────────────────────────

/// One of the three polling days. Ordered chronologically.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Day {
  First,
  Second,
  Third,
}

impl Day {
  pub const ALL: [Day; 3] = [Day::First, Day::Second, Day::Third];

  /// Zero-based position, suitable for indexing per-day arrays.
  pub fn index(self) -> usize {
    match self {
      Self::First => 0,
      Self::Second => 1,
      Self::Third => 2,
    }
  }

  /// One-based day number as operators see it.
  pub fn number(self) -> u8 { self.index() as u8 + 1 }

  pub fn from_number(n: u8) -> Option<Self> {
    match n {
      1 => Some(Self::First),
      2 => Some(Self::Second),
      3 => Some(Self::Third),
      _ => None,
    }
  }
}

impl fmt::Display for Day {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "day {}", self.number())
  }
}

// ─── PollingCalendar ─────────────────────────────────────────────────────────

/// The fixed, strictly increasing set of dates on which votes are counted.
///
/// Any `vote_date` outside these three dates never contributes to a daily
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<NaiveDate>", into = "Vec<NaiveDate>")]
pub struct PollingCalendar {
  dates: [NaiveDate; 3],
}

impl PollingCalendar {
  pub fn new(dates: [NaiveDate; 3]) -> Result<Self> {
    if !(dates[0] < dates[1] && dates[1] < dates[2]) {
      return Err(Error::InvalidCalendar(format!(
        "dates must be strictly increasing, got {} / {} / {}",
        dates[0], dates[1], dates[2]
      )));
    }
    Ok(Self { dates })
  }

  pub fn date(&self, day: Day) -> NaiveDate { self.dates[day.index()] }

  /// Map a calendar date back to its polling day, if it is one.
  pub fn day_of(&self, date: NaiveDate) -> Option<Day> {
    Day::ALL.into_iter().find(|d| self.date(*d) == date)
  }

  pub fn dates(&self) -> [NaiveDate; 3] { self.dates }

  pub fn iter(&self) -> impl Iterator<Item = (Day, NaiveDate)> + '_ {
    Day::ALL.into_iter().map(|d| (d, self.date(d)))
  }
}

impl TryFrom<Vec<NaiveDate>> for PollingCalendar {
  type Error = Error;

  fn try_from(dates: Vec<NaiveDate>) -> Result<Self> {
    let dates: [NaiveDate; 3] = dates.try_into().map_err(|v: Vec<NaiveDate>| {
      Error::InvalidCalendar(format!("expected 3 polling dates, got {}", v.len()))
    })?;
    Self::new(dates)
  }
}

impl From<PollingCalendar> for Vec<NaiveDate> {
  fn from(c: PollingCalendar) -> Self { c.dates.to_vec() }
}
