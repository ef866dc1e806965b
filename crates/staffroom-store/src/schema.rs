//! SQL schema for the staffroom SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// `AUTOINCREMENT` keeps SQLite from handing out the id of a deleted row
/// again.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS identities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL CHECK (length(name) > 0),
    seat_code   TEXT NOT NULL CHECK (length(seat_code) > 0),
    department  TEXT,
    descriptor  TEXT,              -- JSON array of numbers; NULL until enrolled
    status      TEXT NOT NULL DEFAULT 'out'
                CHECK (status IN ('in', 'out', 'class')),
    location    TEXT,              -- room, destination or classroom
    last_seen   TEXT NOT NULL,     -- RFC 3339 UTC
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS identities_seat_idx ON identities(seat_code);

PRAGMA user_version = 1;
";
