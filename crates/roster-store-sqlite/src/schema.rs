//! SQL schema for the roster SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS personnel (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    surname      TEXT NOT NULL,
    identity_key TEXT NOT NULL UNIQUE   -- SSN or equivalent
);

PRAGMA user_version = 1;
";
