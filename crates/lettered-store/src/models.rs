use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A friend request that has not been mutually confirmed yet, in either
/// direction. `is_initiator` records which side sent the invite first as
/// seen from the local database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingRequest {
    pub node_id: String,
    pub hostname: String,
    pub is_initiator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingRequest {
    /// An in-memory row used as a carrier of identity fields when a
    /// friendship closes without a stored pending request.
    pub fn carrier(node_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            node_id: node_id.into(),
            hostname: hostname.into(),
            is_initiator: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A mutually confirmed friendship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friend {
    pub node_id: String,
    pub hostname: String,
    pub alias: String,
    pub created_at: DateTime<Utc>,
}
