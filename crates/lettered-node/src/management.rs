//! Management HTTP API.
//!
//! The local user drives the node through this surface: log in with the
//! console password, read the shareable identifier, send friend invites,
//! list friends. Peers never talk to this API; everything peer-facing
//! goes through the P2P transport.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use lettered_friend::{FriendError, FriendManager};
use lettered_store::Database;

use crate::auth::{Auth, AuthError};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Auth>,
    pub manager: FriendManager,
    pub db: Arc<Mutex<Database>>,
    /// The local node's shareable `nodeID@hostname`.
    pub identifier: String,
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/management/identity", get(identity))
        .route("/management/people/friends", get(list_friends))
        .route("/management/people/invite/send", post(send_invite))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/management/login", post(login))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "management api listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or("");

    match state.auth.access_token_valid(token) {
        Ok(true) => next.run(request).await,
        Ok(false) => error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
        Err(err) => {
            tracing::warn!(error = %err, "error validating session");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Serialize)]
struct IdentityResponse {
    identifier: String,
}

#[derive(Deserialize)]
struct SendInviteRequest {
    identifier: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Response {
    match state.auth.login(&request.password) {
        Ok(access_token) => Json(LoginResponse { access_token }).into_response(),
        Err(err @ AuthError::IncorrectPassword) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err) => {
            tracing::warn!(error = %err, "error processing login");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

async fn identity(State(state): State<AppState>) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        identifier: state.identifier.clone(),
    })
}

async fn send_invite(
    State(state): State<AppState>,
    Json(request): Json<SendInviteRequest>,
) -> Response {
    match state.manager.send_invite(&request.identifier).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(
            err @ (FriendError::InvalidIdentifier
            | FriendError::InviteSelf
            | FriendError::AlreadyFriend),
        ) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        Err(err) => {
            tracing::warn!(error = %err, "error sending invite");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

async fn list_friends(State(state): State<AppState>) -> Response {
    let db = state.db.lock().await;
    match db.list_friends() {
        Ok(friends) => Json(friends).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "error listing friends");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
