//! Integration tests for `SqliteStore` against an in-memory database.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use tokio::task::JoinSet;
use turnout_core::{
  Error as CoreError,
  calendar::{Day, PollingCalendar},
  resync::{ResyncOptions, resync_all},
  station::{NewParticipant, NewStation, ParticipantRole, Station},
  store::TallyStore,
  tally::{DayEdit, Source, TallyEdit},
  trigger::{RecalcCause, TallyEvent},
  vote::{NewVote, VotePatch, VoteQuery},
};
use uuid::Uuid;

use crate::{Error, SqliteStore, encode::encode_uuid};

fn d(day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 9, day).unwrap() }

fn calendar() -> PollingCalendar { PollingCalendar::new([d(12), d(13), d(14)]).unwrap() }

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(calendar())
    .await
    .expect("in-memory store")
}

async fn station(s: &SqliteStore, number: u32) -> Station {
  let (station, _) = s
    .add_station(NewStation { number, address: format!("School #{number}"), lead_id: None })
    .await
    .unwrap();
  station
}

async fn confirm_n(s: &SqliteStore, station_id: Uuid, date: NaiveDate, n: usize) {
  for _ in 0..n {
    s.record_vote(NewVote::confirmed_on(station_id, date)).await.unwrap();
  }
}

fn plan_all(plan: u32) -> TallyEdit {
  let edit = DayEdit { plan: Some(plan), ..DayEdit::default() };
  TallyEdit::default()
    .day(Day::First, edit)
    .day(Day::Second, edit)
    .day(Day::Third, edit)
}

// ─── Stations ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_station_creates_zero_tally() {
  let s = store().await;
  let (station, tally) = s
    .add_station(NewStation { number: 101, address: "Library".into(), lead_id: None })
    .await
    .unwrap();

  assert_eq!(tally.station_id, station.station_id);
  assert_eq!(tally.total_plan(), 0);
  assert_eq!(tally.version, 0);

  let stored = s.get_tally(station.station_id).await.unwrap().unwrap();
  assert_eq!(stored, tally);
  assert_eq!(s.find_station(101).await.unwrap().unwrap().station_id, station.station_id);
}

#[tokio::test]
async fn duplicate_station_number_is_rejected() {
  let s = store().await;
  station(&s, 7).await;

  let err = s
    .add_station(NewStation { number: 7, address: "Elsewhere".into(), lead_id: None })
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::DuplicateStationNumber(7))));
  assert_eq!(s.list_stations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn station_number_must_be_positive() {
  let s = store().await;
  let err = s
    .add_station(NewStation { number: 0, address: "Nowhere".into(), lead_id: None })
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidStationNumber(0))));
  assert!(s.list_stations().await.unwrap().is_empty());
  assert!(s.list_tallies().await.unwrap().is_empty());

  // The schema refuses it too.
  let raw = s
    .execute_raw(format!(
      "INSERT INTO stations (station_id, number, address, created_at)
       VALUES ('{}', 0, 'Nowhere', '2025-09-01T00:00:00+00:00');",
      encode_uuid(Uuid::new_v4()),
    ))
    .await;
  assert!(raw.is_err());
}

#[tokio::test]
async fn list_stations_orders_by_number() {
  let s = store().await;
  station(&s, 30).await;
  station(&s, 10).await;
  station(&s, 20).await;

  let numbers: Vec<u32> = s.list_stations().await.unwrap().iter().map(|s| s.number).collect();
  assert_eq!(numbers, vec![10, 20, 30]);
}

#[tokio::test]
async fn participants_roundtrip() {
  let s = store().await;
  let lead = s
    .add_participant(NewParticipant { full_name: "Irina".into(), role: ParticipantRole::Lead })
    .await
    .unwrap();
  s.add_participant(NewParticipant { full_name: "Boris".into(), role: ParticipantRole::Both })
    .await
    .unwrap();

  let (st, _) = s
    .add_station(NewStation { number: 1, address: "Club".into(), lead_id: Some(lead.participant_id) })
    .await
    .unwrap();
  assert_eq!(st.lead_id, Some(lead.participant_id));

  let all = s.list_participants().await.unwrap();
  let names: Vec<&str> = all.iter().map(|p| p.full_name.as_str()).collect();
  assert_eq!(names, vec!["Boris", "Irina"]);
  assert!(all.iter().all(|p| p.active));
}

#[tokio::test]
async fn assignments_respect_participant_roles() {
  let s = store().await;
  let canvasser = s
    .add_participant(NewParticipant { full_name: "Oleg".into(), role: ParticipantRole::Canvasser })
    .await
    .unwrap();

  let err = s
    .add_station(NewStation {
      number:  1,
      address: "Club".into(),
      lead_id: Some(canvasser.participant_id),
    })
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidAssignment { role: "lead", .. })));

  let st = station(&s, 2).await;
  let lead = s
    .add_participant(NewParticipant { full_name: "Nina".into(), role: ParticipantRole::Lead })
    .await
    .unwrap();
  let vote = NewVote { canvasser_id: Some(lead.participant_id), ..NewVote::new(st.station_id) };
  let err = s.record_vote(vote).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidAssignment { role: "canvasser", .. })));

  let ghost = NewVote { canvasser_id: Some(Uuid::new_v4()), ..NewVote::new(st.station_id) };
  let err = s.record_vote(ghost).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::ParticipantNotFound(_))));
}

// ─── Vote writes ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmation_recalculates_in_same_write() {
  let s = store().await;
  let st = station(&s, 1).await;

  let write = s.record_vote(NewVote::confirmed_on(st.station_id, d(13))).await.unwrap();
  assert_eq!(write.changes.len(), 1);
  assert_eq!(write.changes[0].day, Some(Day::Second));
  assert_eq!(write.tallies.len(), 1);

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  assert_eq!(tally.day(Day::Second).computed_fact, 1);
  assert_eq!(tally.effective_fact(Day::Second), 1);
  assert_eq!(tally.day(Day::Second).source, Source::Calculated);
  assert_eq!(tally.version, 1);
  assert_eq!(write.tallies[0], tally);
}

#[tokio::test]
async fn unconfirmed_vote_does_not_count() {
  let s = store().await;
  let st = station(&s, 1).await;

  s.record_vote(NewVote::new(st.station_id)).await.unwrap();
  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  assert_eq!(tally.total_fact(), 0);
  assert!(tally.days.iter().all(|d| d.computed_fact == 0));
  // 0 == 0 is a tie, which reads as calculated.
  assert!(tally.days.iter().all(|d| d.source == Source::Calculated));
}

#[tokio::test]
async fn off_calendar_date_is_stored_but_not_counted() {
  let s = store().await;
  let st = station(&s, 1).await;

  let write = s.record_vote(NewVote::confirmed_on(st.station_id, d(20))).await.unwrap();
  assert_eq!(write.vote.vote_date, Some(d(20)));
  assert!(s.get_vote(write.vote.voter_id).await.unwrap().is_some());

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  assert_eq!(tally.total_fact(), 0);
}

#[tokio::test]
async fn vote_for_unknown_station_is_rejected() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s.record_vote(NewVote::new(missing)).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::StationNotFound(id)) if *id == missing));
}

#[tokio::test]
async fn revoking_keeps_manual_high_water_mark() {
  let s = store().await;
  let st = station(&s, 1).await;
  let write = s.record_vote(NewVote::new(st.station_id)).await.unwrap();
  let confirmed = s.update_vote(write.vote.voter_id, VotePatch::confirm(d(12))).await.unwrap();
  assert_eq!(confirmed.tallies[0].day(Day::First).computed_fact, 1);

  s.update_vote(write.vote.voter_id, VotePatch::revoke()).await.unwrap();

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  let first = tally.day(Day::First);
  assert_eq!(first.computed_fact, 0);
  assert_eq!(first.manual_fact, 1);
  assert_eq!(first.effective_fact(), 1);
  assert_eq!(first.source, Source::Manual);
}

#[tokio::test]
async fn moving_a_vote_recalculates_both_stations() {
  let s = store().await;
  let a = station(&s, 1).await;
  let b = station(&s, 2).await;
  let write = s.record_vote(NewVote::confirmed_on(a.station_id, d(12))).await.unwrap();

  let moved = s
    .update_vote(write.vote.voter_id, VotePatch {
      station_id: Some(b.station_id),
      ..VotePatch::default()
    })
    .await
    .unwrap();
  assert_eq!(moved.tallies.len(), 2);

  let ta = s.get_tally(a.station_id).await.unwrap().unwrap();
  let tb = s.get_tally(b.station_id).await.unwrap().unwrap();
  assert_eq!(ta.day(Day::First).computed_fact, 0);
  assert_eq!(tb.day(Day::First).computed_fact, 1);
}

#[tokio::test]
async fn irrelevant_patch_skips_recalculation() {
  let s = store().await;
  let st = station(&s, 1).await;
  let canvasser = s
    .add_participant(NewParticipant { full_name: "Vera".into(), role: ParticipantRole::Canvasser })
    .await
    .unwrap();
  let write = s.record_vote(NewVote::confirmed_on(st.station_id, d(12))).await.unwrap();

  let patched = s
    .update_vote(write.vote.voter_id, VotePatch {
      canvasser_id: Some(Some(canvasser.participant_id)),
      ..VotePatch::default()
    })
    .await
    .unwrap();
  assert!(patched.changes.is_empty());
  assert!(patched.tallies.is_empty());
  assert_eq!(patched.vote.canvasser_id, Some(canvasser.participant_id));
  assert_eq!(s.get_tally(st.station_id).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn delete_vote_recalculates() {
  let s = store().await;
  let st = station(&s, 1).await;
  let write = s.record_vote(NewVote::confirmed_on(st.station_id, d(14))).await.unwrap();

  let deleted = s.delete_vote(write.vote.voter_id).await.unwrap();
  assert_eq!(deleted.vote.voter_id, write.vote.voter_id);
  assert!(s.get_vote(write.vote.voter_id).await.unwrap().is_none());

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  assert_eq!(tally.day(Day::Third).computed_fact, 0);

  let err = s.delete_vote(write.vote.voter_id).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::VoteNotFound(_))));
}

#[tokio::test]
async fn list_votes_filters() {
  let s = store().await;
  let a = station(&s, 1).await;
  let b = station(&s, 2).await;
  confirm_n(&s, a.station_id, d(12), 2).await;
  s.record_vote(NewVote::new(a.station_id)).await.unwrap();
  confirm_n(&s, b.station_id, d(12), 1).await;

  let at_a = VoteQuery { station_id: Some(a.station_id), ..VoteQuery::default() };
  assert_eq!(s.list_votes(&at_a).await.unwrap().len(), 3);

  let confirmed_a = VoteQuery { confirmed: Some(true), ..at_a };
  assert_eq!(s.list_votes(&confirmed_a).await.unwrap().len(), 2);

  assert_eq!(s.list_votes(&VoteQuery::default()).await.unwrap().len(), 4);
}

// ─── Reconciliation scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn scenario_confirmations_ratchet_manual() {
  let s = store().await;
  let st = station(&s, 1).await;
  s.edit_tally(st.station_id, plan_all(10), None).await.unwrap();

  confirm_n(&s, st.station_id, d(12), 4).await;

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  let computed: Vec<u32> = tally.days.iter().map(|d| d.computed_fact).collect();
  let manual: Vec<u32> = tally.days.iter().map(|d| d.manual_fact).collect();
  assert_eq!(computed, vec![4, 0, 0]);
  assert_eq!(manual, vec![4, 0, 0]);
  assert_eq!(tally.total_fact(), 4);
  assert!((tally.execution_pct() - 13.333).abs() < 0.01);
}

#[tokio::test]
async fn scenario_locked_day_keeps_manual() {
  let s = store().await;
  let st = station(&s, 1).await;
  let locked = TallyEdit::default()
    .day(Day::First, DayEdit { manual_fact: Some(7), locked: Some(true), ..DayEdit::default() });
  s.edit_tally(st.station_id, plan_all(10), None).await.unwrap();
  s.edit_tally(st.station_id, locked, None).await.unwrap();

  confirm_n(&s, st.station_id, d(12), 4).await;

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  let first = tally.day(Day::First);
  assert_eq!(first.computed_fact, 4);
  assert_eq!(first.manual_fact, 7);
  assert_eq!(first.effective_fact(), 7);
  assert_eq!(first.source, Source::Manual);
}

#[tokio::test]
async fn scenario_manual_above_computed_wins() {
  let s = store().await;
  let st = station(&s, 1).await;
  let edit = TallyEdit::default()
    .day(Day::Second, DayEdit { manual_fact: Some(5), ..DayEdit::default() });
  s.edit_tally(st.station_id, edit, None).await.unwrap();

  confirm_n(&s, st.station_id, d(13), 3).await;

  let tally = s.get_tally(st.station_id).await.unwrap().unwrap();
  let second = tally.day(Day::Second);
  assert_eq!(second.computed_fact, 3);
  assert_eq!(second.manual_fact, 5);
  assert_eq!(second.effective_fact(), 5);
}

#[tokio::test]
async fn batch_resync_isolates_failing_station() {
  let s = store().await;
  let healthy = station(&s, 1).await;
  let orphan = Uuid::new_v4();

  // Votes inserted behind the store's back leave the tally stale.
  s.execute_raw(format!(
    "INSERT INTO votes (voter_id, station_id, confirmed, vote_date, updated_at)
     VALUES ('{}', '{}', 1, '2025-09-12', '2025-09-12T10:00:00+00:00');
     PRAGMA foreign_keys = OFF;
     INSERT INTO daily_tallies (station_id, updated_at)
     VALUES ('{}', '2025-09-12T10:00:00+00:00');
     PRAGMA foreign_keys = ON;",
    encode_uuid(Uuid::new_v4()),
    encode_uuid(healthy.station_id),
    encode_uuid(orphan),
  ))
  .await
  .unwrap();

  let report = resync_all(Arc::new(s.clone()), ResyncOptions::default()).await.unwrap();
  assert_eq!(report.succeeded, 1);
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].station_id, orphan);
  assert_eq!(report.changed.len(), 1);
  assert_eq!(report.changed[0].station_id, healthy.station_id);

  let tally = s.get_tally(healthy.station_id).await.unwrap().unwrap();
  assert_eq!(tally.day(Day::First).computed_fact, 1);
}

// ─── Operator actions ────────────────────────────────────────────────────────

#[tokio::test]
async fn edit_tally_enforces_expected_version() {
  let s = store().await;
  let st = station(&s, 1).await;

  let edited = s.edit_tally(st.station_id, plan_all(5), Some(0)).await.unwrap();
  assert_eq!(edited.version, 1);
  assert_eq!(edited.total_plan(), 15);

  let err = s.edit_tally(st.station_id, plan_all(6), Some(0)).await.unwrap_err();
  assert!(matches!(
    err.as_core(),
    Some(CoreError::VersionConflict { expected: 0, actual: 1, .. })
  ));
  assert_eq!(s.get_tally(st.station_id).await.unwrap().unwrap().total_plan(), 15);
}

#[tokio::test]
async fn edit_tally_for_unknown_station_errors() {
  let s = store().await;
  let err = s.edit_tally(Uuid::new_v4(), plan_all(1), None).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::StationNotFound(_))));
}

#[tokio::test]
async fn dry_run_recalculation_writes_nothing() {
  let s = store().await;
  let st = station(&s, 1).await;
  s.execute_raw(format!(
    "INSERT INTO votes (voter_id, station_id, confirmed, vote_date, updated_at)
     VALUES ('{}', '{}', 1, '2025-09-14', '2025-09-14T10:00:00+00:00');",
    encode_uuid(Uuid::new_v4()),
    encode_uuid(st.station_id),
  ))
  .await
  .unwrap();

  let preview = s.recalculate(st.station_id, true).await.unwrap();
  assert!(preview.dry_run);
  assert!(preview.changed());
  assert_eq!(preview.after.day(Day::Third).computed_fact, 1);
  assert_eq!(s.get_tally(st.station_id).await.unwrap().unwrap().version, 0);

  let applied = s.recalculate(st.station_id, false).await.unwrap();
  assert_eq!(applied.after.version, 1);
  assert_eq!(applied.after, s.get_tally(st.station_id).await.unwrap().unwrap());

  // A second pass finds nothing to do and leaves the version alone.
  let again = s.recalculate(st.station_id, false).await.unwrap();
  assert!(!again.changed());
  assert_eq!(again.after.version, 1);
}

#[tokio::test]
async fn recalculate_unknown_station_errors() {
  let s = store().await;
  let err = s.recalculate(Uuid::new_v4(), false).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::StationNotFound(_))));
}

#[tokio::test]
async fn ensure_tallies_fills_gaps() {
  let s = store().await;
  let a = station(&s, 1).await;
  station(&s, 2).await;
  s.execute_raw(format!(
    "DELETE FROM daily_tallies WHERE station_id = '{}';",
    encode_uuid(a.station_id)
  ))
  .await
  .unwrap();

  assert_eq!(s.ensure_tallies().await.unwrap(), 1);
  assert_eq!(s.ensure_tallies().await.unwrap(), 0);
  assert_eq!(s.list_tallies().await.unwrap().len(), 2);
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribers_see_committed_tally_writes() {
  let s = store().await;
  let st = station(&s, 1).await;
  let mut rx = s.subscribe();

  s.record_vote(NewVote::confirmed_on(st.station_id, d(12))).await.unwrap();
  s.edit_tally(st.station_id, plan_all(3), None).await.unwrap();

  assert_eq!(rx.try_recv().unwrap(), TallyEvent::Recalculated {
    station_id: st.station_id,
    version:    1,
    cause:      RecalcCause::VoteWrite,
  });
  assert_eq!(rx.try_recv().unwrap(), TallyEvent::Edited { station_id: st.station_id, version: 2 });
  assert!(rx.try_recv().is_err());
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_confirmations_are_all_counted() {
  const WRITES: u32 = 24;
  let s = store().await;
  let station_id = station(&s, 1).await.station_id;

  let mut tasks = JoinSet::new();
  for _ in 0..WRITES {
    let s = s.clone();
    tasks.spawn(async move { s.record_vote(NewVote::confirmed_on(station_id, d(12))).await });
  }
  while let Some(joined) = tasks.join_next().await {
    joined.unwrap().unwrap();
  }

  let tally = s.get_tally(station_id).await.unwrap().unwrap();
  assert_eq!(tally.day(Day::First).computed_fact, WRITES);
  assert_eq!(tally.day(Day::First).manual_fact, WRITES);
  assert_eq!(tally.version, u64::from(WRITES));
}

async fn file_store(path: &std::path::Path, retries: u32) -> SqliteStore {
  let s = SqliteStore::open(path, calendar()).await.unwrap().with_busy_retries(retries);
  // Fail fast on a held lock so the retry loop does the waiting.
  s.execute_raw("PRAGMA busy_timeout = 0;").await.unwrap();
  s
}

fn hold_write_lock(path: &std::path::Path) -> rusqlite::Connection {
  let blocker = rusqlite::Connection::open(path).unwrap();
  blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();
  blocker
}

#[tokio::test]
async fn busy_database_is_retried_until_the_lock_clears() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("turnout.db");
  let s = file_store(&path, 8).await;

  let blocker = hold_write_lock(&path);
  let release = std::thread::spawn(move || {
    std::thread::sleep(Duration::from_millis(50));
    blocker.execute_batch("COMMIT;").unwrap();
  });

  let (st, _) = s
    .add_station(NewStation { number: 4, address: "Depot".into(), lead_id: None })
    .await
    .unwrap();
  release.join().unwrap();
  assert_eq!(s.find_station(4).await.unwrap().unwrap().station_id, st.station_id);
}

#[tokio::test]
async fn busy_database_fails_once_retries_run_out() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("turnout.db");
  let s = file_store(&path, 1).await;

  let blocker = hold_write_lock(&path);
  let err = s
    .add_station(NewStation { number: 4, address: "Depot".into(), lead_id: None })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Database(_)), "unexpected error: {err}");
  assert!(s.list_stations().await.unwrap().is_empty());

  blocker.execute_batch("ROLLBACK;").unwrap();
  station(&s, 4).await;
}
