//! Transport client: one TLS connection per request.
//!
//! The dial target and the expected identity both come from the peer's
//! identifier. CA validation is disabled at the TLS layer; the sole
//! server authentication is comparing the node id derived from the
//! observed leaf certificate against the identifier, before any
//! application byte is written.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use lettered_shared::{node_id_from_certificate, wire, Identifier, NodeCertificate};

use crate::error::TransportError;
use crate::tls;

/// Upper bound on one full request round-trip, handshake included, so a
/// stuck peer cannot pin the calling task forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Client {
    config: Arc<rustls::ClientConfig>,
}

impl Client {
    pub fn new(cert: &NodeCertificate) -> Result<Self, TransportError> {
        Ok(Self {
            config: Arc::new(tls::client_config(cert)?),
        })
    }

    /// Send one request frame to the peer named by `identifier` and
    /// return the raw response bytes.
    pub async fn request(
        &self,
        identifier: &str,
        event: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let target: Identifier = identifier.parse()?;
        self.request_to(&target, event, body).await
    }

    /// Like [`Client::request`], for an already-parsed identifier.
    pub async fn request_to(
        &self,
        target: &Identifier,
        event: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let frame = wire::encode_frame(event, body)?;
        match tokio::time::timeout(REQUEST_TIMEOUT, self.round_trip(target, &frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn round_trip(
        &self,
        target: &Identifier,
        frame: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let tcp = TcpStream::connect(target.hostname()).await?;
        let connector = TlsConnector::from(self.config.clone());
        let stream = connector
            .connect(server_name_for(target.hostname())?, tcp)
            .await?;

        // The one and only server authentication step: pin the node id
        // derived from the leaf certificate the handshake produced.
        let actual = {
            let (_, conn) = stream.get_ref();
            let leaf = conn
                .peer_certificates()
                .and_then(|certs| certs.first())
                .ok_or(TransportError::NoServerCert)?;
            node_id_from_certificate(leaf)?
        };
        if &actual != target.node_id() {
            tracing::debug!(
                expected = %target.node_id(),
                actual = %actual,
                host = %target.hostname(),
                "peer identity mismatch"
            );
            return Err(TransportError::NodeIdMismatch {
                expected: target.node_id().clone(),
                actual,
            });
        }

        let (mut reader, mut writer) = tokio::io::split(stream);
        writer.write_all(frame).await?;
        // Half-close: tells the server the request is complete.
        writer.shutdown().await?;

        let mut response = Vec::new();
        reader.read_to_end(&mut response).await?;
        Ok(response)
    }
}

// The hostname is opaque `host:port`; the part before the final colon is
// what goes into SNI.
fn server_name_for(hostname: &str) -> Result<ServerName<'static>, TransportError> {
    let host = hostname
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(hostname);
    ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::InvalidHostname(hostname.to_string()))
}
