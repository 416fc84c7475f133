//! v001 -- Initial schema creation.
//!
//! Creates the two friendship tables: `pending_requests` and `friends`.
//! For any node id at most one of the two holds a row at any instant; the
//! friend manager maintains that invariant.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Pending friend requests (both directions, not yet mutually
-- confirmed). is_initiator = 1 means the local user sent the invite
-- first.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_requests (
    node_id      TEXT PRIMARY KEY NOT NULL,   -- 64-char hex node id
    hostname     TEXT NOT NULL,               -- host:port the peer dials back to
    is_initiator INTEGER NOT NULL,            -- boolean 0/1
    created_at   TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    updated_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Confirmed friends.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friends (
    node_id    TEXT PRIMARY KEY NOT NULL,
    hostname   TEXT NOT NULL,
    alias      TEXT NOT NULL,                 -- peer's self-reported display name
    created_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
