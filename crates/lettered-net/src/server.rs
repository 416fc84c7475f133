//! Transport server: TLS accept loop dispatching one frame per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use lettered_shared::{node_id_from_certificate, wire, NodeCertificate};

use crate::error::TransportError;
use crate::registry::Registry;
use crate::tls;

/// Per-connection deadline covering handshake, read and response write.
const CONNECTION_DEADLINE: Duration = Duration::from_secs(30);

pub struct P2pServer {
    acceptor: TlsAcceptor,
    registry: Arc<Registry>,
}

impl P2pServer {
    pub fn new(cert: &NodeCertificate, registry: Registry) -> Result<Self, TransportError> {
        let config = tls::server_config(cert)?;
        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
            registry: Arc::new(registry),
        })
    }

    /// Bind the given port on all interfaces and serve until the task is
    /// dropped.
    pub async fn serve(&self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        self.serve_on(listener).await
    }

    /// Accept loop over an already-bound listener. Accept errors are
    /// logged and never fatal; each connection runs on its own task.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "p2p server listening");
        loop {
            let (tcp, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                let handled = tokio::time::timeout(
                    CONNECTION_DEADLINE,
                    handle_connection(acceptor, registry, tcp, peer_addr),
                )
                .await;
                if handled.is_err() {
                    tracing::debug!(peer = %peer_addr, "connection deadline exceeded");
                }
            });
        }
    }
}

// Failures in here close the connection without a response; peers learn
// about them only through the closure. An error frame is never written.
async fn handle_connection(
    acceptor: TlsAcceptor,
    registry: Arc<Registry>,
    tcp: TcpStream,
    peer_addr: SocketAddr,
) {
    let mut stream = match acceptor.accept(tcp).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(peer = %peer_addr, error = %err, "tls handshake failed");
            return;
        }
    };

    let caller = {
        let (_, conn) = stream.get_ref();
        conn.peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|leaf| node_id_from_certificate(leaf).ok())
    };
    let Some(caller) = caller else {
        // Unauthenticated connection: close without a word.
        tracing::debug!(peer = %peer_addr, "no usable client certificate, closing");
        let _ = stream.shutdown().await;
        return;
    };

    let (mut reader, mut writer) = tokio::io::split(stream);

    let mut request = Vec::new();
    if let Err(err) = reader.read_to_end(&mut request).await {
        tracing::debug!(peer = %peer_addr, error = %err, "failed reading request");
        return;
    }

    let (event, body) = match wire::decode_frame(&request) {
        Ok((event, body)) => (event, body.to_vec()),
        Err(err) => {
            tracing::debug!(peer = %peer_addr, error = %err, "malformed frame, closing");
            let _ = writer.shutdown().await;
            return;
        }
    };

    let Some(handler) = registry.get(&event) else {
        tracing::debug!(peer = %peer_addr, event = %event, "no such event, closing");
        let _ = writer.shutdown().await;
        return;
    };

    tracing::debug!(peer = %peer_addr, caller = %caller.short(), event = %event, "dispatching");
    match handler(caller, body).await {
        Ok(response) => {
            if let Err(err) = writer.write_all(&response).await {
                tracing::debug!(peer = %peer_addr, error = %err, "failed writing response");
            }
        }
        Err(err) => {
            tracing::debug!(peer = %peer_addr, event = %event, error = %err, "handler error, closing");
        }
    }
    let _ = writer.shutdown().await;
}
