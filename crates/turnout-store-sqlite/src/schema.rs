//! SQL schema for the turnout SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS participants (
    participant_id TEXT PRIMARY KEY,
    full_name      TEXT NOT NULL,
    role           TEXT NOT NULL,            -- 'canvasser' | 'lead' | 'both'
    active         INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS stations (
    station_id TEXT PRIMARY KEY,
    number     INTEGER NOT NULL UNIQUE CHECK (number > 0),
    address    TEXT NOT NULL,
    lead_id    TEXT REFERENCES participants(participant_id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

-- One row per planned voter. Only station_id, confirmed and vote_date feed
-- the daily tallies.
CREATE TABLE IF NOT EXISTS votes (
    voter_id     TEXT PRIMARY KEY,
    station_id   TEXT NOT NULL REFERENCES stations(station_id) ON DELETE CASCADE,
    canvasser_id TEXT REFERENCES participants(participant_id) ON DELETE SET NULL,
    confirmed    INTEGER NOT NULL DEFAULT 0,
    vote_date    TEXT,                       -- YYYY-MM-DD or NULL
    updated_at   TEXT NOT NULL
);

-- Exactly one row per station. Columns are suffixed with the polling day.
CREATE TABLE IF NOT EXISTS daily_tallies (
    station_id   TEXT PRIMARY KEY REFERENCES stations(station_id) ON DELETE CASCADE,
    plan_1       INTEGER NOT NULL DEFAULT 0 CHECK (plan_1 >= 0),
    plan_2       INTEGER NOT NULL DEFAULT 0 CHECK (plan_2 >= 0),
    plan_3       INTEGER NOT NULL DEFAULT 0 CHECK (plan_3 >= 0),
    manual_1     INTEGER NOT NULL DEFAULT 0 CHECK (manual_1 >= 0),
    manual_2     INTEGER NOT NULL DEFAULT 0 CHECK (manual_2 >= 0),
    manual_3     INTEGER NOT NULL DEFAULT 0 CHECK (manual_3 >= 0),
    computed_1   INTEGER NOT NULL DEFAULT 0 CHECK (computed_1 >= 0),
    computed_2   INTEGER NOT NULL DEFAULT 0 CHECK (computed_2 >= 0),
    computed_3   INTEGER NOT NULL DEFAULT 0 CHECK (computed_3 >= 0),
    locked_1     INTEGER NOT NULL DEFAULT 0,
    locked_2     INTEGER NOT NULL DEFAULT 0,
    locked_3     INTEGER NOT NULL DEFAULT 0,
    source_1     TEXT NOT NULL DEFAULT 'manual',
    source_2     TEXT NOT NULL DEFAULT 'manual',
    source_3     TEXT NOT NULL DEFAULT 'manual',
    version      INTEGER NOT NULL DEFAULT 0,
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS votes_count_idx     ON votes(station_id, confirmed, vote_date);
CREATE INDEX IF NOT EXISTS votes_canvasser_idx ON votes(canvasser_id);

PRAGMA user_version = 1;
";
