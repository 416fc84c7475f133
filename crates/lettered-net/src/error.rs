use lettered_shared::{FrameError, IdentityError, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("peer presented no certificate")]
    NoServerCert,

    #[error("node id mismatch: expected {expected}, connected to {actual}")]
    NodeIdMismatch { expected: NodeId, actual: NodeId },

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("body codec error: {0}")]
    Body(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,
}
