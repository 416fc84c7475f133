//! Event registry: binds event names to typed handlers.
//!
//! The transport server works in raw bytes; the registry wraps a typed
//! handler `Fn(caller, Request) -> Future<Result<Response>>` so that body
//! decoding and response encoding live in one place. A handler failure
//! (including a body that does not decode) makes the server close the
//! connection without a response.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use lettered_shared::NodeId;

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send>>;

/// Byte-level handler: caller node id and raw body in, raw response out.
pub type EventHandler = Arc<dyn Fn(NodeId, Vec<u8>) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, EventHandler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a byte-level handler. Registering the same event again
    /// replaces the earlier handler.
    pub fn register(&mut self, event: impl Into<String>, handler: EventHandler) {
        self.handlers.insert(event.into(), handler);
    }

    /// Install a typed handler for an event.
    pub fn on<Req, Res, F, Fut>(&mut self, event: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + 'static,
        F: Fn(NodeId, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Res>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let wrapped: EventHandler = Arc::new(move |caller, body| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let request: Req =
                    serde_json::from_slice(&body).context("decode request body")?;
                let response = handler(caller, request).await?;
                serde_json::to_vec(&response).context("encode response body")
            })
        });
        self.register(event, wrapped);
    }

    pub(crate) fn get(&self, event: &str) -> Option<EventHandler> {
        self.handlers.get(event).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettered_shared::wire::{PingRequest, PingResponse, EVENT_PING};

    fn caller() -> NodeId {
        NodeId::from_spki_der(b"registry-test-key")
    }

    #[tokio::test]
    async fn typed_handler_round_trip() {
        let mut registry = Registry::new();
        registry.on(EVENT_PING, |_caller, req: PingRequest| async move {
            Ok(PingResponse {
                message: req.message,
            })
        });

        let handler = registry.get(EVENT_PING).expect("registered");
        let body = serde_json::to_vec(&PingRequest {
            message: "hello".into(),
        })
        .unwrap();

        let response = handler(caller(), body).await.unwrap();
        let decoded: PingResponse = serde_json::from_slice(&response).unwrap();
        assert_eq!(decoded.message, "hello");
    }

    #[tokio::test]
    async fn undecodable_body_is_a_handler_error() {
        let mut registry = Registry::new();
        registry.on(EVENT_PING, |_caller, req: PingRequest| async move {
            Ok(PingResponse {
                message: req.message,
            })
        });

        let handler = registry.get(EVENT_PING).unwrap();
        assert!(handler(caller(), b"\xff\xff".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier() {
        let mut registry = Registry::new();
        registry.on(EVENT_PING, |_caller, _req: PingRequest| async move {
            Ok(PingResponse {
                message: "first".into(),
            })
        });
        registry.on(EVENT_PING, |_caller, _req: PingRequest| async move {
            Ok(PingResponse {
                message: "second".into(),
            })
        });

        let handler = registry.get(EVENT_PING).unwrap();
        let body = serde_json::to_vec(&PingRequest::default()).unwrap();
        let decoded: PingResponse =
            serde_json::from_slice(&handler(caller(), body).await.unwrap()).unwrap();
        assert_eq!(decoded.message, "second");
    }

    #[test]
    fn unknown_event_has_no_handler() {
        let registry = Registry::new();
        assert!(registry.get("NOPE").is_none());
    }
}
