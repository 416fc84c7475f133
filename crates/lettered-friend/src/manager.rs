//! The friendship state machine.
//!
//! Per peer, the local database is in one of four states: no row, a
//! pending request we initiated, a pending request the peer initiated, or
//! a confirmed friend. [`FriendManager::send_invite`] and
//! [`FriendManager::receive_invite`] move between them such that two nodes
//! inviting each other converge on a mutual friendship under any
//! interleaving of calls, retries, and one side wiping its database.
//!
//! The key rules making that hold: the calling side always records itself
//! as the initiator after an unaccepted invite, and an incoming invite
//! against an initiator-marked pending row always closes the friendship.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use lettered_net::{Client, Peer};
use lettered_shared::wire::{FriendInviteRequest, FriendInviteResponse};
use lettered_shared::{Identifier, NodeId};
use lettered_store::{Database, PendingRequest};

use crate::error::FriendError;

#[derive(Clone)]
pub struct FriendManager {
    node_id: NodeId,
    hostname: String,
    alias: String,
    db: Arc<Mutex<Database>>,
    client: Client,
    // One async mutex per peer so that find-then-create / find-then-update
    // sections for the same node id never interleave.
    peer_locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FriendManager {
    pub fn new(
        node_id: NodeId,
        hostname: impl Into<String>,
        alias: impl Into<String>,
        db: Arc<Mutex<Database>>,
        client: Client,
    ) -> Self {
        Self {
            node_id,
            hostname: hostname.into(),
            alias: alias.into(),
            db,
            client,
            peer_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Send a friend request to the peer named by `identifier`.
    ///
    /// On an accepted reply the friendship closes immediately; otherwise a
    /// pending request marked as ours is recorded. A transport failure
    /// leaves storage untouched.
    pub async fn send_invite(&self, identifier: &str) -> Result<(), FriendError> {
        let target: Identifier = identifier
            .parse()
            .map_err(|_| FriendError::InvalidIdentifier)?;

        if target.node_id() == &self.node_id {
            return Err(FriendError::InviteSelf);
        }
        if self
            .db
            .lock()
            .await
            .friend_exists(target.node_id().as_str())?
        {
            return Err(FriendError::AlreadyFriend);
        }

        // The round-trip happens outside the per-peer lock: the peer's
        // handler may be inviting us back through our own server at this
        // very moment, and holding the lock here would deadlock the pair.
        let response = Peer::new(self.client.clone(), target.clone())
            .friend_invite(&FriendInviteRequest {
                hostname: self.hostname.clone(),
                alias: self.alias.clone(),
            })
            .await?;

        let _peer_guard = self.peer_lock(target.node_id())?.lock_owned().await;
        let db = self.db.lock().await;

        if response.accepted {
            tracing::info!(
                peer = %target.node_id().short(),
                alias = %response.alias,
                "friend request accepted"
            );
            close_friendship(&db, target.node_id().as_str(), target.hostname(), &response.alias)?;
            return Ok(());
        }

        match db.find_pending_request(target.node_id().as_str())? {
            None => {
                db.create_pending_request(target.node_id().as_str(), target.hostname(), true)?;
                tracing::info!(peer = %target.node_id().short(), "friend request recorded as pending");
            }
            Some(mut pending) => {
                pending.hostname = target.hostname().to_string();
                // The peer may have silently forgotten an invite it once
                // sent us; from this call on, we are the initiator.
                pending.is_initiator = true;
                db.update_pending_request(&pending)?;
            }
        }
        Ok(())
    }

    /// Handle an incoming friend request from `caller`.
    ///
    /// Accepts when the caller is already a friend or when we had invited
    /// the caller first; records or refreshes an incoming pending request
    /// otherwise.
    pub async fn receive_invite(
        &self,
        caller: &NodeId,
        request: &FriendInviteRequest,
    ) -> Result<FriendInviteResponse, FriendError> {
        // A node talking to itself must not end up in its own tables.
        if caller == &self.node_id {
            return Err(FriendError::InviteSelf);
        }

        let _peer_guard = self.peer_lock(caller)?.lock_owned().await;
        let db = self.db.lock().await;

        if db.friend_exists(caller.as_str())? {
            return Ok(self.accepted());
        }

        match db.find_pending_request(caller.as_str())? {
            None => {
                db.create_pending_request(caller.as_str(), &request.hostname, false)?;
                tracing::info!(peer = %caller.short(), "incoming friend request recorded");
                Ok(FriendInviteResponse::default())
            }
            Some(pending) if pending.is_initiator => {
                close_friendship(&db, caller.as_str(), &request.hostname, &request.alias)?;
                tracing::info!(peer = %caller.short(), "friendship confirmed");
                Ok(self.accepted())
            }
            Some(mut pending) => {
                pending.hostname = request.hostname.clone();
                db.update_pending_request(&pending)?;
                Ok(FriendInviteResponse::default())
            }
        }
    }

    fn accepted(&self) -> FriendInviteResponse {
        FriendInviteResponse {
            accepted: true,
            alias: self.alias.clone(),
        }
    }

    fn peer_lock(&self, node_id: &NodeId) -> Result<Arc<Mutex<()>>, FriendError> {
        let mut locks = self
            .peer_locks
            .lock()
            .map_err(|_| FriendError::LockPoisoned)?;
        Ok(locks
            .entry(node_id.as_str().to_string())
            .or_default()
            .clone())
    }
}

// Convert a pending request into a friend row. The stored row (when there
// is one) only contributes its creation; identity fields are taken from
// the current exchange so the friend row carries the freshest endpoint.
fn close_friendship(
    db: &Database,
    node_id: &str,
    hostname: &str,
    alias: &str,
) -> Result<(), FriendError> {
    let mut pending = db
        .find_pending_request(node_id)?
        .unwrap_or_else(|| PendingRequest::carrier(node_id, hostname));
    pending.hostname = hostname.to_string();

    db.create_friend(&pending, alias)?;
    db.delete_pending_request(node_id)?;
    Ok(())
}
