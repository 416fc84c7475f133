//! CRUD for the friendship tables.
//!
//! `find_*` returning `None` and `delete_*` on an absent row are not
//! errors; `StoreError` is reserved for the storage layer itself failing.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Friend, PendingRequest};

impl Database {
    /// Look up the pending request for a node id, if any.
    pub fn find_pending_request(&self, node_id: &str) -> Result<Option<PendingRequest>> {
        self.conn()
            .query_row(
                "SELECT node_id, hostname, is_initiator, created_at, updated_at
                 FROM pending_requests WHERE node_id = ?1",
                params![node_id],
                row_to_pending_request,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Insert a new pending request and return the stored row.
    pub fn create_pending_request(
        &self,
        node_id: &str,
        hostname: &str,
        is_initiator: bool,
    ) -> Result<PendingRequest> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO pending_requests (node_id, hostname, is_initiator, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node_id,
                hostname,
                is_initiator,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(PendingRequest {
            node_id: node_id.to_string(),
            hostname: hostname.to_string(),
            is_initiator,
            created_at: now,
            updated_at: now,
        })
    }

    /// Persist the whole row, matching on `node_id`. `updated_at` is
    /// refreshed as part of the write.
    pub fn update_pending_request(&self, pending: &PendingRequest) -> Result<()> {
        self.conn().execute(
            "UPDATE pending_requests
             SET hostname = ?2, is_initiator = ?3, updated_at = ?4
             WHERE node_id = ?1",
            params![
                pending.node_id,
                pending.hostname,
                pending.is_initiator,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Delete the pending request for a node id. No-op when absent.
    pub fn delete_pending_request(&self, node_id: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM pending_requests WHERE node_id = ?1",
            params![node_id],
        )?;
        Ok(())
    }

    /// Insert a friend row populated from a pending request's identity
    /// fields plus the peer's self-reported alias.
    pub fn create_friend(&self, pending: &PendingRequest, alias: &str) -> Result<Friend> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO friends (node_id, hostname, alias, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![pending.node_id, pending.hostname, alias, now.to_rfc3339()],
        )?;

        Ok(Friend {
            node_id: pending.node_id.clone(),
            hostname: pending.hostname.clone(),
            alias: alias.to_string(),
            created_at: now,
        })
    }

    /// Whether a confirmed friend row exists for this node id.
    pub fn friend_exists(&self, node_id: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM friends WHERE node_id = ?1",
            params![node_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All confirmed friends, most recent first.
    pub fn list_friends(&self) -> Result<Vec<Friend>> {
        let mut stmt = self.conn().prepare(
            "SELECT node_id, hostname, alias, created_at
             FROM friends ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_friend)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_pending_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingRequest> {
    Ok(PendingRequest {
        node_id: row.get(0)?,
        hostname: row.get(1)?,
        is_initiator: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
        updated_at: parse_timestamp(row, 4)?,
    })
}

fn row_to_friend(row: &rusqlite::Row<'_>) -> rusqlite::Result<Friend> {
    Ok(Friend {
        node_id: row.get(0)?,
        hostname: row.get(1)?,
        alias: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
    })
}

fn parse_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
