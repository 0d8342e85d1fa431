//! [`SqliteStore`], the SQLite implementation of [`TallyStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tokio::sync::broadcast;
use uuid::Uuid;

use turnout_core::{
  Error as CoreError,
  calendar::PollingCalendar,
  reconcile::{DayChange, VoteCounter, compute_daily_counts, recalculate},
  station::{NewParticipant, NewStation, Participant, ParticipantRole, Station},
  store::TallyStore,
  tally::{DailyTally, TallyEdit},
  trigger::{
    RecalcCause, RecalcOutcome, TallyEvent, VoteWrite, affected_stations, vote_changes,
  },
  vote::{NewVote, VotePatch, VoteQuery, VoteRecord},
};

use crate::{
  Error, Result,
  encode::{
    PARTICIPANT_COLUMNS, RawParticipant, RawStation, RawTally, RawVote, STATION_COLUMNS,
    TALLY_COLUMNS, VOTE_COLUMNS, decode_role, encode_date, encode_dt, encode_role,
    encode_source, encode_uuid,
  },
  schema::SCHEMA,
};

/// Result of a closure run inside [`SqliteStore::with_retry`]: the outer
/// error is the database, the inner one a domain rejection that rolled the
/// transaction back.
type TxResult<T> = std::result::Result<std::result::Result<T, CoreError>, tokio_rusqlite::Error>;

const EVENT_CAPACITY: usize = 256;
const DEFAULT_BUSY_RETRIES: u32 = 5;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A turnout store backed by a single SQLite file.
///
/// Cloning is cheap: the connection and the event channel are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:         tokio_rusqlite::Connection,
  calendar:     PollingCalendar,
  events:       broadcast::Sender<TallyEvent>,
  busy_retries: u32,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, calendar: PollingCalendar) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, calendar).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(calendar: PollingCalendar) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, calendar).await
  }

  /// How many times a write transaction is retried when SQLite reports the
  /// database busy or locked.
  pub fn with_busy_retries(mut self, retries: u32) -> Self {
    self.busy_retries = retries;
    self
  }

  async fn init(conn: tokio_rusqlite::Connection, calendar: PollingCalendar) -> Result<Self> {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let store = Self { conn, calendar, events, busy_retries: DEFAULT_BUSY_RETRIES };
    store
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(store)
  }

  /// Run a write transaction, retrying it from scratch while the database is
  /// busy. The closure must open and commit its own transaction.
  async fn with_retry<F, R>(&self, op: F) -> Result<R>
  where
    F: Fn(&mut rusqlite::Connection) -> TxResult<R> + Clone + Send + 'static,
    R: Send + 'static,
  {
    let mut attempt = 0;
    loop {
      match self.conn.call(op.clone()).await {
        Err(e) if is_busy(&e) && attempt < self.busy_retries => {
          attempt += 1;
          tracing::warn!(attempt, "database busy, retrying transaction");
          tokio::time::sleep(Duration::from_millis(10 << attempt.min(6))).await;
        }
        other => return Ok(other??),
      }
    }
  }

  fn publish(&self, event: TallyEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }

  /// Run raw SQL against the connection, bypassing the store's invariants.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn is_busy(e: &tokio_rusqlite::Error) -> bool {
  matches!(
    e,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(err, _))
      if matches!(err.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
  )
}

fn decode_failure(e: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(e)) }

// ─── In-transaction helpers ──────────────────────────────────────────────────

/// Counts confirmed votes through an open connection or transaction.
struct SqlCounter<'a>(&'a rusqlite::Connection);

impl VoteCounter for SqlCounter<'_> {
  type Error = rusqlite::Error;

  fn count_confirmed(&self, station_id: Uuid, date: chrono::NaiveDate) -> rusqlite::Result<u32> {
    self.0.query_row(
      "SELECT COUNT(*) FROM votes
       WHERE station_id = ?1 AND confirmed = 1 AND vote_date = ?2",
      rusqlite::params![encode_uuid(station_id), encode_date(date)],
      |r| r.get(0),
    )
  }
}

fn station_exists(conn: &rusqlite::Connection, station_id: Uuid) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM stations WHERE station_id = ?1",
        rusqlite::params![encode_uuid(station_id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Check that `participant_id` exists and holds `role`.
fn check_role(
  conn: &rusqlite::Connection,
  participant_id: Uuid,
  role: &'static str,
  holds: fn(ParticipantRole) -> bool,
) -> TxResult<()> {
  let raw: Option<String> = conn
    .query_row(
      "SELECT role FROM participants WHERE participant_id = ?1",
      rusqlite::params![encode_uuid(participant_id)],
      |r| r.get(0),
    )
    .optional()?;
  let Some(raw) = raw else {
    return Ok(Err(CoreError::ParticipantNotFound(participant_id)));
  };
  if holds(decode_role(&raw).map_err(decode_failure)?) {
    Ok(Ok(()))
  } else {
    Ok(Err(CoreError::InvalidAssignment { participant_id, role }))
  }
}

fn load_tally(
  conn: &rusqlite::Connection,
  station_id: Uuid,
) -> std::result::Result<Option<DailyTally>, tokio_rusqlite::Error> {
  let raw = conn
    .query_row(
      &format!("SELECT {TALLY_COLUMNS} FROM daily_tallies WHERE station_id = ?1"),
      rusqlite::params![encode_uuid(station_id)],
      RawTally::from_row,
    )
    .optional()?;
  raw.map(RawTally::into_tally).transpose().map_err(decode_failure)
}

fn load_vote(
  conn: &rusqlite::Connection,
  voter_id: Uuid,
) -> std::result::Result<Option<VoteRecord>, tokio_rusqlite::Error> {
  let raw = conn
    .query_row(
      &format!("SELECT {VOTE_COLUMNS} FROM votes WHERE voter_id = ?1"),
      rusqlite::params![encode_uuid(voter_id)],
      RawVote::from_row,
    )
    .optional()?;
  raw.map(RawVote::into_vote).transpose().map_err(decode_failure)
}

fn insert_tally(conn: &rusqlite::Connection, tally: &DailyTally) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO daily_tallies (station_id, updated_at) VALUES (?1, ?2)",
    rusqlite::params![encode_uuid(tally.station_id), encode_dt(tally.updated_at)],
  )?;
  write_tally(conn, tally)
}

/// Persist every per-day field of `tally` in a single statement.
fn write_tally(conn: &rusqlite::Connection, tally: &DailyTally) -> rusqlite::Result<()> {
  let d = &tally.days;
  conn.execute(
    "UPDATE daily_tallies SET
       plan_1 = ?2, plan_2 = ?3, plan_3 = ?4,
       manual_1 = ?5, manual_2 = ?6, manual_3 = ?7,
       computed_1 = ?8, computed_2 = ?9, computed_3 = ?10,
       locked_1 = ?11, locked_2 = ?12, locked_3 = ?13,
       source_1 = ?14, source_2 = ?15, source_3 = ?16,
       version = ?17, updated_at = ?18
     WHERE station_id = ?1",
    rusqlite::params![
      encode_uuid(tally.station_id),
      d[0].plan,
      d[1].plan,
      d[2].plan,
      d[0].manual_fact,
      d[1].manual_fact,
      d[2].manual_fact,
      d[0].computed_fact,
      d[1].computed_fact,
      d[2].computed_fact,
      d[0].locked,
      d[1].locked,
      d[2].locked,
      encode_source(d[0].source),
      encode_source(d[1].source),
      encode_source(d[2].source),
      tally.version as i64,
      encode_dt(tally.updated_at),
    ],
  )?;
  Ok(())
}

/// One station's recalculation inside an open transaction.
struct Recalc {
  before:  DailyTally,
  after:   DailyTally,
  changes: Vec<DayChange>,
}

/// Recalculate `station_id` against the votes visible to `conn`.
///
/// A missing tally is created on the spot (unless `dry_run`). The tally row
/// is only written when something changed, so the version stays put across
/// no-op recalculations.
fn recalc_station(
  conn: &rusqlite::Connection,
  calendar: &PollingCalendar,
  station_id: Uuid,
  now: DateTime<Utc>,
  dry_run: bool,
) -> std::result::Result<Recalc, tokio_rusqlite::Error> {
  let before = match load_tally(conn, station_id)? {
    Some(t) => t,
    None => {
      let fresh = DailyTally::new(station_id, now);
      if !dry_run {
        tracing::info!(%station_id, "creating missing daily tally");
        insert_tally(conn, &fresh)?;
      }
      fresh
    }
  };

  let counts = compute_daily_counts(&SqlCounter(conn), station_id, calendar)?;
  let computation = recalculate(&before, counts);
  let changes = computation.changes(&before);

  let mut after = before.clone();
  if !changes.is_empty() {
    after.apply(&computation);
    after.version += 1;
    after.updated_at = now;
    if !dry_run {
      write_tally(conn, &after)?;
    }
  }
  Ok(Recalc { before, after, changes })
}

/// The three shapes of vote write.
#[derive(Clone)]
enum VoteOp {
  Insert(VoteRecord),
  Update(Uuid, VotePatch),
  Delete(Uuid),
}

struct AppliedVote {
  write:   VoteWrite,
  /// Tallies whose row was rewritten.
  written: Vec<DailyTally>,
}

/// Apply a vote write and recalculate every affected station in one
/// `BEGIN IMMEDIATE` transaction.
fn apply_vote(
  conn: &mut rusqlite::Connection,
  calendar: &PollingCalendar,
  op: VoteOp,
) -> TxResult<AppliedVote> {
  let now = Utc::now();
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  // `vote` is the record reported back: the new state, or the deleted one.
  let (before, after, vote) = match op {
    VoteOp::Insert(vote) => (None, Some(vote.clone()), vote),
    VoteOp::Update(voter_id, patch) => {
      let Some(before) = load_vote(&tx, voter_id)? else {
        return Ok(Err(CoreError::VoteNotFound(voter_id)));
      };
      let mut after = before.clone();
      after.apply(&patch);
      after.updated_at = now;
      (Some(before), Some(after.clone()), after)
    }
    VoteOp::Delete(voter_id) => {
      let Some(before) = load_vote(&tx, voter_id)? else {
        return Ok(Err(CoreError::VoteNotFound(voter_id)));
      };
      (Some(before.clone()), None, before)
    }
  };

  if let Some(a) = &after {
    let moved = before.as_ref().is_none_or(|b| b.station_id != a.station_id);
    if moved && !station_exists(&tx, a.station_id)? {
      return Ok(Err(CoreError::StationNotFound(a.station_id)));
    }
    let reassigned = before.as_ref().is_none_or(|b| b.canvasser_id != a.canvasser_id);
    if let Some(canvasser_id) = a.canvasser_id
      && reassigned
      && let Err(e) = check_role(&tx, canvasser_id, "canvasser", ParticipantRole::is_canvasser)?
    {
      return Ok(Err(e));
    }
  }

  match (&before, &after) {
    (None, Some(a)) => {
      let raw = RawVote::from_vote(a);
      tx.execute(
        &format!("INSERT INTO votes ({VOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        rusqlite::params![
          raw.voter_id,
          raw.station_id,
          raw.canvasser_id,
          raw.confirmed,
          raw.vote_date,
          raw.updated_at,
        ],
      )?;
    }
    (Some(_), Some(a)) => {
      let raw = RawVote::from_vote(a);
      tx.execute(
        "UPDATE votes SET station_id = ?2, canvasser_id = ?3, confirmed = ?4,
           vote_date = ?5, updated_at = ?6
         WHERE voter_id = ?1",
        rusqlite::params![
          raw.voter_id,
          raw.station_id,
          raw.canvasser_id,
          raw.confirmed,
          raw.vote_date,
          raw.updated_at,
        ],
      )?;
    }
    (Some(b), None) => {
      tx.execute(
        "DELETE FROM votes WHERE voter_id = ?1",
        rusqlite::params![encode_uuid(b.voter_id)],
      )?;
    }
    (None, None) => {}
  }

  let changes = vote_changes(before.as_ref(), after.as_ref(), calendar);
  let mut tallies = Vec::new();
  let mut written = Vec::new();
  for station_id in affected_stations(&changes) {
    let recalc = recalc_station(&tx, calendar, station_id, now, false)?;
    if !recalc.changes.is_empty() {
      written.push(recalc.after.clone());
    }
    tallies.push(recalc.after);
  }
  tx.commit()?;

  Ok(Ok(AppliedVote { write: VoteWrite { vote, changes, tallies }, written }))
}

// ─── TallyStore impl ─────────────────────────────────────────────────────────

impl SqliteStore {
  async fn run_vote_op(&self, op: VoteOp) -> Result<VoteWrite> {
    let calendar = self.calendar;
    let applied = self
      .with_retry(move |conn| apply_vote(conn, &calendar, op.clone()))
      .await?;

    let vote = &applied.write.vote;
    if vote.has_off_calendar_date(&self.calendar) {
      tracing::warn!(
        voter_id = %vote.voter_id,
        vote_date = ?vote.vote_date,
        "vote date is not a polling day; it will not be counted",
      );
    }
    for tally in applied.written {
      tracing::debug!(
        station_id = %tally.station_id,
        version = tally.version,
        "tally recalculated after vote write",
      );
      self.publish(TallyEvent::Recalculated {
        station_id: tally.station_id,
        version:    tally.version,
        cause:      RecalcCause::VoteWrite,
      });
    }
    Ok(applied.write)
  }
}

impl TallyStore for SqliteStore {
  type Error = Error;

  fn calendar(&self) -> &PollingCalendar { &self.calendar }

  fn subscribe(&self) -> broadcast::Receiver<TallyEvent> { self.events.subscribe() }

  // ── Stations ──────────────────────────────────────────────────────────────

  async fn add_station(&self, input: NewStation) -> Result<(Station, DailyTally)> {
    if input.number == 0 {
      return Err(CoreError::InvalidStationNumber(input.number).into());
    }
    let station = Station {
      station_id: Uuid::new_v4(),
      number:     input.number,
      address:    input.address,
      lead_id:    input.lead_id,
      created_at: Utc::now(),
    };
    let tally = DailyTally::new(station.station_id, station.created_at);

    let (s, t) = (station.clone(), tally.clone());
    self
      .with_retry(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM stations WHERE number = ?1",
            rusqlite::params![s.number],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(Err(CoreError::DuplicateStationNumber(s.number)));
        }
        if let Some(lead_id) = s.lead_id
          && let Err(e) = check_role(&tx, lead_id, "lead", ParticipantRole::is_lead)?
        {
          return Ok(Err(e));
        }
        tx.execute(
          &format!("INSERT INTO stations ({STATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
          rusqlite::params![
            encode_uuid(s.station_id),
            s.number,
            s.address,
            s.lead_id.map(encode_uuid),
            encode_dt(s.created_at),
          ],
        )?;
        insert_tally(&tx, &t)?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    tracing::info!(station_id = %station.station_id, number = station.number, "station created");
    Ok((station, tally))
  }

  async fn get_station(&self, id: Uuid) -> Result<Option<Station>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawStation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {STATION_COLUMNS} FROM stations WHERE station_id = ?1"),
              rusqlite::params![id_str],
              RawStation::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawStation::into_station).transpose()
  }

  async fn find_station(&self, number: u32) -> Result<Option<Station>> {
    let raw: Option<RawStation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {STATION_COLUMNS} FROM stations WHERE number = ?1"),
              rusqlite::params![number],
              RawStation::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawStation::into_station).transpose()
  }

  async fn list_stations(&self) -> Result<Vec<Station>> {
    let raws: Vec<RawStation> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {STATION_COLUMNS} FROM stations ORDER BY number"))?;
        let rows = stmt
          .query_map([], RawStation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawStation::into_station).collect()
  }

  // ── Participants ──────────────────────────────────────────────────────────

  async fn add_participant(&self, input: NewParticipant) -> Result<Participant> {
    let participant = Participant {
      participant_id: Uuid::new_v4(),
      full_name:      input.full_name,
      role:           input.role,
      active:         true,
    };

    let id_str = encode_uuid(participant.participant_id);
    let name = participant.full_name.clone();
    let role = encode_role(participant.role);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!("INSERT INTO participants ({PARTICIPANT_COLUMNS}) VALUES (?1, ?2, ?3, 1)"),
          rusqlite::params![id_str, name, role],
        )?;
        Ok(())
      })
      .await?;
    Ok(participant)
  }

  async fn list_participants(&self) -> Result<Vec<Participant>> {
    let raws: Vec<RawParticipant> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PARTICIPANT_COLUMNS} FROM participants ORDER BY full_name"
        ))?;
        let rows = stmt
          .query_map([], RawParticipant::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawParticipant::into_participant).collect()
  }

  // ── Votes ─────────────────────────────────────────────────────────────────

  async fn record_vote(&self, input: NewVote) -> Result<VoteWrite> {
    let vote = VoteRecord {
      voter_id:     Uuid::new_v4(),
      station_id:   input.station_id,
      canvasser_id: input.canvasser_id,
      confirmed:    input.confirmed,
      vote_date:    input.vote_date,
      updated_at:   Utc::now(),
    };
    self.run_vote_op(VoteOp::Insert(vote)).await
  }

  async fn update_vote(&self, voter_id: Uuid, patch: VotePatch) -> Result<VoteWrite> {
    self.run_vote_op(VoteOp::Update(voter_id, patch)).await
  }

  async fn delete_vote(&self, voter_id: Uuid) -> Result<VoteWrite> {
    self.run_vote_op(VoteOp::Delete(voter_id)).await
  }

  async fn get_vote(&self, voter_id: Uuid) -> Result<Option<VoteRecord>> {
    let raw: Option<RawVote> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {VOTE_COLUMNS} FROM votes WHERE voter_id = ?1"),
              rusqlite::params![encode_uuid(voter_id)],
              RawVote::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawVote::into_vote).transpose()
  }

  async fn list_votes(&self, query: &VoteQuery) -> Result<Vec<VoteRecord>> {
    let station = query.station_id.map(encode_uuid);
    let canvasser = query.canvasser_id.map(encode_uuid);
    let confirmed = query.confirmed;

    let raws: Vec<RawVote> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VOTE_COLUMNS} FROM votes
           WHERE (?1 IS NULL OR station_id = ?1)
             AND (?2 IS NULL OR canvasser_id = ?2)
             AND (?3 IS NULL OR confirmed = ?3)
           ORDER BY station_id, voter_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![station, canvasser, confirmed], RawVote::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawVote::into_vote).collect()
  }

  // ── Tallies ───────────────────────────────────────────────────────────────

  async fn get_tally(&self, station_id: Uuid) -> Result<Option<DailyTally>> {
    Ok(self.conn.call(move |conn| load_tally(conn, station_id)).await?)
  }

  async fn list_tallies(&self) -> Result<Vec<DailyTally>> {
    let raws: Vec<RawTally> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {TALLY_COLUMNS} FROM daily_tallies ORDER BY station_id"))?;
        let rows = stmt
          .query_map([], RawTally::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawTally::into_tally).collect()
  }

  async fn edit_tally(
    &self,
    station_id: Uuid,
    edit: TallyEdit,
    expected_version: Option<u64>,
  ) -> Result<DailyTally> {
    let tally = self
      .with_retry(move |conn| {
        let now = Utc::now();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut tally = match load_tally(&tx, station_id)? {
          Some(t) => t,
          None if station_exists(&tx, station_id)? => {
            let fresh = DailyTally::new(station_id, now);
            insert_tally(&tx, &fresh)?;
            fresh
          }
          None => return Ok(Err(CoreError::StationNotFound(station_id))),
        };
        if let Some(expected) = expected_version {
          if expected != tally.version {
            return Ok(Err(CoreError::VersionConflict {
              station_id,
              expected,
              actual: tally.version,
            }));
          }
        }
        tally.apply_edit(&edit);
        tally.version += 1;
        tally.updated_at = now;
        write_tally(&tx, &tally)?;
        tx.commit()?;
        Ok(Ok(tally))
      })
      .await?;

    tracing::info!(%station_id, version = tally.version, "tally edited by operator");
    self.publish(TallyEvent::Edited { station_id, version: tally.version });
    Ok(tally)
  }

  async fn recalculate(&self, station_id: Uuid, dry_run: bool) -> Result<RecalcOutcome> {
    let calendar = self.calendar;
    let recalc = self
      .with_retry(move |conn| {
        let behavior =
          if dry_run { TransactionBehavior::Deferred } else { TransactionBehavior::Immediate };
        let tx = conn.transaction_with_behavior(behavior)?;
        if !station_exists(&tx, station_id)? {
          return Ok(Err(CoreError::StationNotFound(station_id)));
        }
        let recalc = recalc_station(&tx, &calendar, station_id, Utc::now(), dry_run)?;
        tx.commit()?;
        Ok(Ok(recalc))
      })
      .await?;

    if !dry_run && !recalc.changes.is_empty() {
      tracing::info!(
        %station_id,
        version = recalc.after.version,
        days = recalc.changes.len(),
        "tally recalculated",
      );
      self.publish(TallyEvent::Recalculated {
        station_id,
        version: recalc.after.version,
        cause: RecalcCause::Operator,
      });
    }

    Ok(RecalcOutcome {
      station_id,
      before: recalc.before,
      after: recalc.after,
      changes: recalc.changes,
      dry_run,
    })
  }

  async fn ensure_tallies(&self) -> Result<usize> {
    let now = encode_dt(Utc::now());
    let created = self
      .with_retry(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = tx.execute(
          "INSERT INTO daily_tallies (station_id, updated_at)
           SELECT station_id, ?1 FROM stations
           WHERE station_id NOT IN (SELECT station_id FROM daily_tallies)",
          rusqlite::params![now],
        )?;
        tx.commit()?;
        Ok(Ok(n))
      })
      .await?;

    if created > 0 {
      tracing::info!(created, "created missing daily tallies");
    }
    Ok(created)
  }
}
