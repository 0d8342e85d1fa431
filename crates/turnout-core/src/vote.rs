//! Individual vote records, the source of truth behind every computed fact.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::calendar::{Day, PollingCalendar};

/// One planned voter and whether (and when) their vote was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
  pub voter_id:     Uuid,
  pub station_id:   Uuid,
  pub canvasser_id: Option<Uuid>,
  pub confirmed:    bool,
  pub vote_date:    Option<NaiveDate>,
  pub updated_at:   DateTime<Utc>,
}

impl VoteRecord {
  /// The polling day this record counts toward, if any.
  ///
  /// A record counts iff it is confirmed and its date is one of the three
  /// polling dates.
  pub fn counted_day(&self, calendar: &PollingCalendar) -> Option<Day> {
    if !self.confirmed {
      return None;
    }
    self.vote_date.and_then(|d| calendar.day_of(d))
  }

  /// Whether `vote_date` is set to something the calendar does not know.
  pub fn has_off_calendar_date(&self, calendar: &PollingCalendar) -> bool {
    self.vote_date.is_some_and(|d| calendar.day_of(d).is_none())
  }

  /// Apply a partial update in place.
  pub fn apply(&mut self, patch: &VotePatch) {
    if let Some(station_id) = patch.station_id {
      self.station_id = station_id;
    }
    if let Some(canvasser_id) = patch.canvasser_id {
      self.canvasser_id = canvasser_id;
    }
    if let Some(confirmed) = patch.confirmed {
      self.confirmed = confirmed;
    }
    if let Some(vote_date) = patch.vote_date {
      self.vote_date = vote_date;
    }
  }
}

/// Input to [`crate::store::TallyStore::record_vote`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewVote {
  pub station_id:   Uuid,
  #[serde(default)]
  pub canvasser_id: Option<Uuid>,
  #[serde(default)]
  pub confirmed:    bool,
  #[serde(default)]
  pub vote_date:    Option<NaiveDate>,
}

impl NewVote {
  pub fn new(station_id: Uuid) -> Self {
    Self { station_id, canvasser_id: None, confirmed: false, vote_date: None }
  }

  /// A confirmed vote on `date`.
  pub fn confirmed_on(station_id: Uuid, date: NaiveDate) -> Self {
    Self { confirmed: true, vote_date: Some(date), ..Self::new(station_id) }
  }
}

/// A partial update to a [`VoteRecord`].
///
/// Nullable fields use `Option<Option<_>>`: absent leaves the field alone,
/// `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VotePatch {
  #[serde(default)]
  pub station_id:   Option<Uuid>,
  #[serde(default, deserialize_with = "present")]
  pub canvasser_id: Option<Option<Uuid>>,
  #[serde(default)]
  pub confirmed:    Option<bool>,
  #[serde(default, deserialize_with = "present")]
  pub vote_date:    Option<Option<NaiveDate>>,
}

impl VotePatch {
  pub fn confirm(date: NaiveDate) -> Self {
    Self { confirmed: Some(true), vote_date: Some(Some(date)), ..Self::default() }
  }

  pub fn revoke() -> Self { Self { confirmed: Some(false), ..Self::default() } }
}

fn present<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

/// Parameters for [`crate::store::TallyStore::list_votes`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteQuery {
  pub station_id:   Option<Uuid>,
  pub canvasser_id: Option<Uuid>,
  pub confirmed:    Option<bool>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn calendar() -> PollingCalendar {
    let d = |n| NaiveDate::from_ymd_opt(2025, 9, n).unwrap();
    PollingCalendar::new([d(12), d(13), d(14)]).unwrap()
  }

  fn record(confirmed: bool, date: Option<NaiveDate>) -> VoteRecord {
    VoteRecord {
      voter_id: Uuid::new_v4(),
      station_id: Uuid::new_v4(),
      canvasser_id: None,
      confirmed,
      vote_date: date,
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn only_confirmed_calendar_dates_count() {
    let cal = calendar();
    let on = NaiveDate::from_ymd_opt(2025, 9, 13);
    let off = NaiveDate::from_ymd_opt(2025, 9, 20);

    assert_eq!(record(true, on).counted_day(&cal), Some(Day::Second));
    assert_eq!(record(false, on).counted_day(&cal), None);
    assert_eq!(record(true, off).counted_day(&cal), None);
    assert_eq!(record(true, None).counted_day(&cal), None);
    assert!(record(false, off).has_off_calendar_date(&cal));
  }

  #[test]
  fn patch_distinguishes_absent_from_null() {
    let patch: VotePatch = serde_json::from_str(r#"{"vote_date": null}"#).unwrap();
    assert_eq!(patch.vote_date, Some(None));
    assert_eq!(patch.canvasser_id, None);

    let mut r = record(true, NaiveDate::from_ymd_opt(2025, 9, 12));
    r.apply(&patch);
    assert_eq!(r.vote_date, None);
    assert!(r.confirmed);
  }
}
