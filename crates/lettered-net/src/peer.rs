//! Typed convenience calls against one peer.

use serde::de::DeserializeOwned;
use serde::Serialize;

use lettered_shared::wire::{
    FriendInviteRequest, FriendInviteResponse, PingRequest, PingResponse, EVENT_FRIEND_INVITE,
    EVENT_PING,
};
use lettered_shared::Identifier;

use crate::client::Client;
use crate::error::TransportError;

/// A handle for calling one specific peer's services.
pub struct Peer {
    client: Client,
    target: Identifier,
}

impl Peer {
    pub fn new(client: Client, target: Identifier) -> Self {
        Self { client, target }
    }

    /// Liveness check: the peer echoes the message back.
    pub async fn ping(&self, request: &PingRequest) -> Result<PingResponse, TransportError> {
        self.call(EVENT_PING, request).await
    }

    /// Ask the peer to become a friend.
    pub async fn friend_invite(
        &self,
        request: &FriendInviteRequest,
    ) -> Result<FriendInviteResponse, TransportError> {
        self.call(EVENT_FRIEND_INVITE, request).await
    }

    // An empty response body decodes as the response type's default: the
    // server closes without writing when it has nothing to say, and a
    // zero-valued reply is the defined reading of that.
    async fn call<Req, Res>(&self, event: &str, request: &Req) -> Result<Res, TransportError>
    where
        Req: Serialize,
        Res: DeserializeOwned + Default,
    {
        let body = serde_json::to_vec(request)?;
        let response = self.client.request_to(&self.target, event, &body).await?;
        if response.is_empty() {
            return Ok(Res::default());
        }
        Ok(serde_json::from_slice(&response)?)
    }
}
