mod auth;
mod config;
mod management;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lettered_friend::FriendManager;
use lettered_net::{Client, P2pServer, Registry};
use lettered_shared::wire::{
    FriendInviteRequest, PingRequest, PingResponse, EVENT_FRIEND_INVITE, EVENT_PING,
};
use lettered_shared::{load_or_create_certificate, Identifier};
use lettered_store::Database;

use crate::auth::Auth;
use crate::management::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lettered_node=debug")),
        )
        .init();

    info!("starting lettered node v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load();
    config::ensure_data_dir(&config)?;
    info!(
        alias = %config.alias,
        hostname = %config.hostname,
        p2p_port = config.p2p_port,
        data_dir = %config.app_data_dir.display(),
        "loaded configuration"
    );

    let cert = load_or_create_certificate(
        &config.app_data_dir.join("tls.cert"),
        &config.app_data_dir.join("tls.key"),
    )?;
    let node_id = cert.node_id()?;
    let identifier = Identifier::new(node_id.clone(), config.hostname.clone());
    info!(identifier = %identifier, "node identity ready");

    let db = Arc::new(Mutex::new(Database::open_at(
        &config.app_data_dir.join("db.sqlite"),
    )?));

    let client = Client::new(&cert)?;
    let manager = FriendManager::new(
        node_id,
        config.hostname.clone(),
        config.alias.clone(),
        Arc::clone(&db),
        client,
    );

    let mut registry = Registry::new();
    registry.on(EVENT_PING, |_caller, request: PingRequest| async move {
        Ok(PingResponse {
            message: request.message,
        })
    });
    let invite_manager = manager.clone();
    registry.on(
        EVENT_FRIEND_INVITE,
        move |caller, request: FriendInviteRequest| {
            let manager = invite_manager.clone();
            async move { Ok(manager.receive_invite(&caller, &request).await?) }
        },
    );

    let p2p_server = P2pServer::new(&cert, registry)?;
    let p2p_port = config.p2p_port;
    tokio::spawn(async move {
        if let Err(err) = p2p_server.serve(p2p_port).await {
            tracing::error!(error = %err, "p2p server failed");
        }
    });

    let state = AppState {
        auth: Arc::new(Auth::new(
            config.management.password.clone(),
            Duration::from_secs(config.management.session_timeout_secs),
        )),
        manager,
        db,
        identifier: identifier.to_string(),
    };

    tokio::select! {
        result = management::serve(state, config.management.port) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "management server failed");
                return Err(err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl+c, shutting down");
        }
    }

    Ok(())
}
