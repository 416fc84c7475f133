use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid identifier")]
    InvalidIdentifier,

    #[error("invalid node id")]
    InvalidNodeId,

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
}

#[derive(Error, Debug)]
pub enum CertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("certificate generation error: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("invalid PEM material: {0}")]
    InvalidPem(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame too short for declared header")]
    ShortHeader,

    #[error("frame header is {0} bytes, limit is 65535")]
    HeaderTooLong(usize),

    #[error("malformed frame header: {0}")]
    Malformed(#[from] serde_json::Error),
}
