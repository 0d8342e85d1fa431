//! Error types for `turnout-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("station not found: {0}")]
  StationNotFound(Uuid),

  #[error("vote record not found: {0}")]
  VoteNotFound(Uuid),

  #[error("no daily tally for station {0}")]
  TallyNotFound(Uuid),

  #[error("station number {0} is already taken")]
  DuplicateStationNumber(u32),

  #[error("station number must be positive, got {0}")]
  InvalidStationNumber(u32),

  #[error("tally for station {station_id} is at version {actual}, expected {expected}")]
  VersionConflict {
    station_id: Uuid,
    expected:   u64,
    actual:     u64,
  },

  #[error("invalid polling calendar: {0}")]
  InvalidCalendar(String),

  /// A participant was assigned to a role they do not hold.
  #[error("participant {participant_id} cannot act as {role}")]
  InvalidAssignment {
    participant_id: Uuid,
    role:           &'static str,
  },

  #[error("participant not found: {0}")]
  ParticipantNotFound(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
