//! Polling stations and the field staff attached to them.
//!
//! Only the fields the tally engine and its reports consume are modelled
//! here; voter personal data lives elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A polling station (UIK). Owns exactly one [`DailyTally`](crate::tally::DailyTally).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
  pub station_id: Uuid,
  /// The public UIK number; unique across the store.
  pub number:     u32,
  pub address:    String,
  /// The team lead assigned to this station, if any.
  pub lead_id:    Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::TallyStore::add_station`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewStation {
  pub number:  u32,
  pub address: String,
  #[serde(default)]
  pub lead_id: Option<Uuid>,
}

/// What a participant does in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
  /// Works a list of planned voters.
  Canvasser,
  /// Supervises canvassers at a station and confirms votes.
  Lead,
  Both,
}

impl ParticipantRole {
  pub fn is_canvasser(self) -> bool { matches!(self, Self::Canvasser | Self::Both) }

  pub fn is_lead(self) -> bool { matches!(self, Self::Lead | Self::Both) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
  pub participant_id: Uuid,
  pub full_name:      String,
  pub role:           ParticipantRole,
  pub active:         bool,
}

/// Input to [`crate::store::TallyStore::add_participant`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewParticipant {
  pub full_name: String,
  pub role:      ParticipantRole,
}
