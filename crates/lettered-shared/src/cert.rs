//! Node certificate management.
//!
//! Every node owns a long-lived self-signed ECDSA P-384 certificate; its
//! public key is what the node id is derived from. The certificate and key
//! are kept as PEM files next to the database and reloaded on restart, so
//! the node id stays stable across runs.

use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime, Time};

use crate::error::{CertError, IdentityError};
use crate::identity::{node_id_from_certificate, NodeId};

const COMMON_NAME: &str = "lettered";
const VALIDITY_DAYS: i64 = 365;

/// A node's TLS identity: one self-signed leaf certificate plus its
/// private key, in DER form ready for rustls.
pub struct NodeCertificate {
    cert_der: CertificateDer<'static>,
    key_der: PrivateKeyDer<'static>,
}

impl Clone for NodeCertificate {
    fn clone(&self) -> Self {
        Self {
            cert_der: self.cert_der.clone(),
            key_der: self.key_der.clone_key(),
        }
    }
}

impl NodeCertificate {
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// The certificate chain to present during handshakes. Always a single
    /// self-signed leaf.
    pub fn certificate_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.cert_der.clone()]
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.key_der.clone_key()
    }

    /// Derive the node id from this certificate's public key.
    pub fn node_id(&self) -> Result<NodeId, IdentityError> {
        node_id_from_certificate(&self.cert_der)
    }
}

/// Load the PEM pair from `cert_path`/`key_path`, falling back to
/// generating and persisting a fresh certificate on any load failure
/// (including the files simply not existing yet).
pub fn load_or_create_certificate(
    cert_path: &Path,
    key_path: &Path,
) -> Result<NodeCertificate, CertError> {
    match load_certificate(cert_path, key_path) {
        Ok(cert) => Ok(cert),
        Err(err) => {
            tracing::info!(error = %err, "creating new tls certificate");
            create_certificate(cert_path, key_path)
        }
    }
}

fn load_certificate(cert_path: &Path, key_path: &Path) -> Result<NodeCertificate, CertError> {
    let cert_pem = fs::read(cert_path)?;
    let mut reader = &cert_pem[..];
    let cert_der = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| CertError::InvalidPem("no CERTIFICATE block".into()))??;

    let key_pem = fs::read(key_path)?;
    let mut reader = &key_pem[..];
    let key_der = rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| CertError::InvalidPem("no private key block".into()))?;

    // A certificate no identity can be derived from is useless; treat it
    // like any other load failure so it gets regenerated.
    node_id_from_certificate(&cert_der)?;

    Ok(NodeCertificate { cert_der, key_der })
}

fn create_certificate(cert_path: &Path, key_path: &Path) -> Result<NodeCertificate, CertError> {
    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384)?;

    let mut params = CertificateParams::new(vec![COMMON_NAME.to_string()])?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, COMMON_NAME);
    dn.push(DnType::OrganizationName, "Lettered");
    dn.push(DnType::OrganizationalUnitName, "Automatically Generated");
    params.distinguished_name = dn;

    let not_before = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);
    params.not_before = not_before;
    params.not_after = not_before + Duration::days(VALIDITY_DAYS);

    let mut serial = [0u8; 16];
    OsRng.fill_bytes(&mut serial);
    params.serial_number = Some(SerialNumber::from_slice(&serial));

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let cert = params.self_signed(&key_pair)?;

    write_pem_file(cert_path, cert.pem().as_bytes(), 0o644)?;
    write_pem_file(key_path, key_pair.serialize_pem().as_bytes(), 0o600)?;

    let cert_der = cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    Ok(NodeCertificate { cert_der, key_der })
}

// The certificate is shareable (0644); the private key must not be
// readable by other users (0600).
#[cfg(unix)]
fn write_pem_file(path: &Path, pem: &[u8], mode: u32) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    // The open mode is masked by the umask and ignored for files that
    // already exist; force the exact bits either way.
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.write_all(pem)
}

#[cfg(not(unix))]
fn write_pem_file(path: &Path, pem: &[u8], _mode: u32) -> std::io::Result<()> {
    fs::write(path, pem)
}
