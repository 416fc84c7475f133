use std::fmt;
use std::str::FromStr;

use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::IdentityError;

// Node identity = SHA-256 of the PKIX (SubjectPublicKeyInfo) encoding of
// the node certificate's public key, as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Derive a node id from the DER-encoded SubjectPublicKeyInfo of a
    /// public key.
    pub fn from_spki_der(spki: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(spki)))
    }

    /// Parse a node id, rejecting anything that is not exactly 64
    /// lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if s.len() != 64 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(IdentityError::InvalidNodeId);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the node id of whoever presented the given leaf certificate.
///
/// The hash input is the raw SubjectPublicKeyInfo DER, so the id is stable
/// across re-issued certificates as long as the key pair is kept.
pub fn node_id_from_certificate(
    cert: &CertificateDer<'_>,
) -> Result<NodeId, IdentityError> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|e| IdentityError::InvalidCertificate(e.to_string()))?;
    Ok(NodeId::from_spki_der(parsed.public_key().raw))
}

/// Human-shareable node address: `<nodeID>@<hostname>`.
///
/// The hostname part is opaque to this crate; it is handed verbatim to the
/// TCP dialer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    node_id: NodeId,
    hostname: String,
}

impl Identifier {
    pub fn new(node_id: NodeId, hostname: impl Into<String>) -> Self {
        Self {
            node_id,
            hostname: hostname.into(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node_id, self.hostname)
    }
}

impl FromStr for Identifier {
    type Err = IdentityError;

    // Exactly one '@' separates node id and hostname; zero or multiple
    // '@' signs are invalid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split('@');
        let (node_part, host_part) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(n), Some(h), None) => (n, h),
            _ => return Err(IdentityError::InvalidIdentifier),
        };
        if host_part.is_empty() {
            return Err(IdentityError::InvalidIdentifier);
        }
        let node_id =
            NodeId::parse(node_part).map_err(|_| IdentityError::InvalidIdentifier)?;
        Ok(Self {
            node_id,
            hostname: host_part.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hexes(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    #[test]
    fn node_id_is_deterministic_lowercase_hex() {
        let a = NodeId::from_spki_der(b"some-spki-bytes");
        let b = NodeId::from_spki_der(b"some-spki-bytes");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a
            .as_str()
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));

        let other = NodeId::from_spki_der(b"other-spki-bytes");
        assert_ne!(a, other);
    }

    #[test]
    fn node_id_parse_rejects_bad_shapes() {
        assert!(NodeId::parse(&hexes('a')).is_ok());
        assert!(NodeId::parse("").is_err());
        assert!(NodeId::parse(&hexes('a')[..63]).is_err());
        assert!(NodeId::parse(&hexes('A')).is_err()); // uppercase
        assert!(NodeId::parse(&hexes('g')).is_err()); // not hex
        assert!(NodeId::parse(&format!("{}0", hexes('a'))).is_err());
    }

    #[test]
    fn identifier_round_trip() {
        let node_id = NodeId::parse(&hexes('b')).unwrap();
        let ident = Identifier::new(node_id.clone(), "example.com:1926");

        let parsed: Identifier = ident.to_string().parse().unwrap();
        assert_eq!(parsed.node_id(), &node_id);
        assert_eq!(parsed.hostname(), "example.com:1926");
    }

    #[test]
    fn identifier_rejects_wrong_at_counts() {
        let id = hexes('c');
        assert!(id.parse::<Identifier>().is_err());
        assert!(format!("{id}@").parse::<Identifier>().is_err());
        assert!(format!("{id}@host@extra").parse::<Identifier>().is_err());
        assert!("@host".parse::<Identifier>().is_err());
    }

    #[test]
    fn identifier_rejects_bad_node_id() {
        assert!("nothex@host".parse::<Identifier>().is_err());
        let short = &hexes('d')[..10];
        assert!(format!("{short}@host").parse::<Identifier>().is_err());
    }
}
