//! TLS configuration for the P2P transport.
//!
//! There is no certificate authority anywhere in this system: every node
//! presents a self-signed certificate, and trust comes from re-deriving
//! the peer's node id out of the leaf certificate the TLS stack actually
//! saw. The verifiers here therefore bypass chain validation entirely
//! while keeping the handshake-signature checks that prove the peer holds
//! the private key for the certificate it presented.
//!
//! SECURITY: the `danger` APIs are used intentionally. The client-side
//! node-id pinning check happens in [`crate::client`] before any
//! application byte is written; the server derives the caller's node id
//! in [`crate::server`] before dispatching.

use std::sync::{Arc, LazyLock};

use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, ServerConfig, SignatureScheme};

use lettered_shared::{node_id_from_certificate, NodeCertificate};

use crate::error::TransportError;

/// Lazily-initialized crypto provider for rustls, backed by ring.
static CRYPTO_PROVIDER: LazyLock<Arc<CryptoProvider>> =
    LazyLock::new(|| Arc::new(rustls::crypto::ring::default_provider()));

/// Node certificates are ECDSA; nothing else is accepted in handshakes.
const SUPPORTED_SCHEMES: [SignatureScheme; 2] = [
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::ECDSA_NISTP256_SHA256,
];

/// TLS 1.3-only client configuration presenting the node's certificate and
/// accepting any structurally valid server certificate. The caller pins
/// the server's node id after the handshake.
pub fn client_config(cert: &NodeCertificate) -> Result<ClientConfig, TransportError> {
    let config = ClientConfig::builder_with_provider(CRYPTO_PROVIDER.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NodeServerCertVerifier))
        .with_client_auth_cert(cert.certificate_chain(), cert.private_key())?;
    Ok(config)
}

/// TLS 1.3-only server configuration that requests (but does not require)
/// a client certificate. Connections without one complete the handshake
/// and are closed by the request handler.
pub fn server_config(cert: &NodeCertificate) -> Result<ServerConfig, TransportError> {
    let config = ServerConfig::builder_with_provider(CRYPTO_PROVIDER.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_client_cert_verifier(Arc::new(NodeClientCertVerifier))
        .with_single_cert(cert.certificate_chain(), cert.private_key())?;
    Ok(config)
}

// A certificate is acceptable at the TLS layer iff a node id can be
// derived from it; everything beyond that is checked against the expected
// identity outside the handshake.
fn ensure_node_identity(cert: &CertificateDer<'_>) -> Result<(), rustls::Error> {
    node_id_from_certificate(cert).map(|_| ()).map_err(|_| {
        rustls::Error::InvalidCertificate(rustls::CertificateError::BadEncoding)
    })
}

#[derive(Debug)]
struct NodeServerCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NodeServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        ensure_node_identity(end_entity)?;
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &CRYPTO_PROVIDER.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &CRYPTO_PROVIDER.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        SUPPORTED_SCHEMES.to_vec()
    }
}

#[derive(Debug)]
struct NodeClientCertVerifier;

impl rustls::server::danger::ClientCertVerifier for NodeClientCertVerifier {
    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::server::danger::ClientCertVerified, rustls::Error> {
        ensure_node_identity(end_entity)?;
        Ok(rustls::server::danger::ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &CRYPTO_PROVIDER.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &CRYPTO_PROVIDER.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        SUPPORTED_SCHEMES.to_vec()
    }

    // A missing client certificate is handled above the TLS layer: the
    // server closes such connections without dispatching.
    fn client_auth_mandatory(&self) -> bool {
        false
    }
}
