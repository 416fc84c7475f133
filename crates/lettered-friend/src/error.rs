use thiserror::Error;

use lettered_net::TransportError;
use lettered_store::StoreError;

#[derive(Error, Debug)]
pub enum FriendError {
    #[error("invalid identifier")]
    InvalidIdentifier,

    #[error("cannot invite to self")]
    InviteSelf,

    #[error("already a friend")]
    AlreadyFriend,

    #[error("peer lock table poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
