//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, polling dates are `YYYY-MM-DD`, UUIDs are
//! hyphenated lowercase strings and enums are their lowercase names.

use chrono::{DateTime, NaiveDate, Utc};
use turnout_core::{
  station::{Participant, ParticipantRole, Station},
  tally::{DailyTally, DayTally, Source},
  vote::VoteRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── Dates ────────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn encode_source(s: Source) -> &'static str {
  match s {
    Source::Manual => "manual",
    Source::Calculated => "calculated",
  }
}

pub fn decode_source(s: &str) -> Result<Source> {
  match s {
    "manual" => Ok(Source::Manual),
    "calculated" => Ok(Source::Calculated),
    other => Err(Error::Decode(format!("unknown tally source: {other:?}"))),
  }
}

pub fn encode_role(r: ParticipantRole) -> &'static str {
  match r {
    ParticipantRole::Canvasser => "canvasser",
    ParticipantRole::Lead => "lead",
    ParticipantRole::Both => "both",
  }
}

pub fn decode_role(s: &str) -> Result<ParticipantRole> {
  match s {
    "canvasser" => Ok(ParticipantRole::Canvasser),
    "lead" => Ok(ParticipantRole::Lead),
    "both" => Ok(ParticipantRole::Both),
    other => Err(Error::Decode(format!("unknown participant role: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const STATION_COLUMNS: &str = "station_id, number, address, lead_id, created_at";

/// Raw values read directly from a `stations` row.
pub struct RawStation {
  pub station_id: String,
  pub number:     u32,
  pub address:    String,
  pub lead_id:    Option<String>,
  pub created_at: String,
}

impl RawStation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      station_id: row.get(0)?,
      number:     row.get(1)?,
      address:    row.get(2)?,
      lead_id:    row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_station(self) -> Result<Station> {
    Ok(Station {
      station_id: decode_uuid(&self.station_id)?,
      number:     self.number,
      address:    self.address,
      lead_id:    decode_opt_uuid(self.lead_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const PARTICIPANT_COLUMNS: &str = "participant_id, full_name, role, active";

pub struct RawParticipant {
  pub participant_id: String,
  pub full_name:      String,
  pub role:           String,
  pub active:         bool,
}

impl RawParticipant {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      participant_id: row.get(0)?,
      full_name:      row.get(1)?,
      role:           row.get(2)?,
      active:         row.get(3)?,
    })
  }

  pub fn into_participant(self) -> Result<Participant> {
    Ok(Participant {
      participant_id: decode_uuid(&self.participant_id)?,
      full_name:      self.full_name,
      role:           decode_role(&self.role)?,
      active:         self.active,
    })
  }
}

pub const VOTE_COLUMNS: &str =
  "voter_id, station_id, canvasser_id, confirmed, vote_date, updated_at";

/// Raw values read directly from a `votes` row.
#[derive(Clone)]
pub struct RawVote {
  pub voter_id:     String,
  pub station_id:   String,
  pub canvasser_id: Option<String>,
  pub confirmed:    bool,
  pub vote_date:    Option<String>,
  pub updated_at:   String,
}

impl RawVote {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      voter_id:     row.get(0)?,
      station_id:   row.get(1)?,
      canvasser_id: row.get(2)?,
      confirmed:    row.get(3)?,
      vote_date:    row.get(4)?,
      updated_at:   row.get(5)?,
    })
  }

  pub fn from_vote(v: &VoteRecord) -> Self {
    Self {
      voter_id:     encode_uuid(v.voter_id),
      station_id:   encode_uuid(v.station_id),
      canvasser_id: v.canvasser_id.map(encode_uuid),
      confirmed:    v.confirmed,
      vote_date:    v.vote_date.map(encode_date),
      updated_at:   encode_dt(v.updated_at),
    }
  }

  pub fn into_vote(self) -> Result<VoteRecord> {
    Ok(VoteRecord {
      voter_id:     decode_uuid(&self.voter_id)?,
      station_id:   decode_uuid(&self.station_id)?,
      canvasser_id: decode_opt_uuid(self.canvasser_id)?,
      confirmed:    self.confirmed,
      vote_date:    self.vote_date.as_deref().map(decode_date).transpose()?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub const TALLY_COLUMNS: &str = "station_id,
  plan_1, plan_2, plan_3,
  manual_1, manual_2, manual_3,
  computed_1, computed_2, computed_3,
  locked_1, locked_2, locked_3,
  source_1, source_2, source_3,
  version, updated_at";

/// Raw values read directly from a `daily_tallies` row. Per-day arrays are
/// indexed by `Day::index`.
pub struct RawTally {
  pub station_id: String,
  pub plan:       [u32; 3],
  pub manual:     [u32; 3],
  pub computed:   [u32; 3],
  pub locked:     [bool; 3],
  pub source:     [String; 3],
  pub version:    i64,
  pub updated_at: String,
}

impl RawTally {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      station_id: row.get(0)?,
      plan:       [row.get(1)?, row.get(2)?, row.get(3)?],
      manual:     [row.get(4)?, row.get(5)?, row.get(6)?],
      computed:   [row.get(7)?, row.get(8)?, row.get(9)?],
      locked:     [row.get(10)?, row.get(11)?, row.get(12)?],
      source:     [row.get(13)?, row.get(14)?, row.get(15)?],
      version:    row.get(16)?,
      updated_at: row.get(17)?,
    })
  }

  pub fn into_tally(self) -> Result<DailyTally> {
    let mut days = [DayTally::default(); 3];
    for (i, slot) in days.iter_mut().enumerate() {
      *slot = DayTally {
        plan:          self.plan[i],
        manual_fact:   self.manual[i],
        computed_fact: self.computed[i],
        locked:        self.locked[i],
        source:        decode_source(&self.source[i])?,
      };
    }
    Ok(DailyTally {
      station_id: decode_uuid(&self.station_id)?,
      days,
      version: u64::try_from(self.version)
        .map_err(|_| Error::Decode(format!("negative tally version {}", self.version)))?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
