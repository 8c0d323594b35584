//! Application-facing socket API.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Uri};
use sockjs_common::frame::close_code;
use sockjs_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;

use crate::session::{Session, SessionClosed};

/// Application logic attached to a SockJS service. Called once per session,
/// on its own task, right after the open frame has been handed out.
#[async_trait]
pub trait SocketHandler: Send + Sync + 'static {
    async fn on_open(&self, socket: SockJsSocket);
}

/// One open session as seen by the application.
///
/// The client-chosen session id is never exposed here; `id()` is a
/// server-generated handle suitable for logging.
pub struct SockJsSocket {
    id: String,
    session: Arc<Session>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl SockJsSocket {
    pub(crate) fn new(session: Arc<Session>, inbound: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            id: prefixed_ulid(prefix::SOCKET),
            session,
            inbound,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// URI of the request that opened the session.
    pub fn uri(&self) -> &Uri {
        self.session.request().uri()
    }

    /// Headers of the opening request, without cookies.
    pub fn headers(&self) -> &HeaderMap {
        self.session.request().headers()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.session.request().remote_addr()
    }

    /// Next message from the client. `None` once the session has closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Queue a message for the client.
    pub fn send(&self, message: impl Into<String>) -> Result<(), SessionClosed> {
        self.session.enqueue(message.into())
    }

    /// Close the session. Later receivers are answered with this close.
    pub fn close(&self, code: u16, reason: &str) {
        self.session.close(code, reason);
    }
}

/// Sends every message straight back.
pub struct EchoHandler;

#[async_trait]
impl SocketHandler for EchoHandler {
    async fn on_open(&self, mut socket: SockJsSocket) {
        while let Some(message) = socket.recv().await {
            if socket.send(message).is_err() {
                break;
            }
        }
        tracing::debug!(socket_id = %socket.id(), "echo socket finished");
    }
}

/// Closes every session as soon as it opens.
pub struct CloseHandler;

#[async_trait]
impl SocketHandler for CloseHandler {
    async fn on_open(&self, socket: SockJsSocket) {
        socket.close(close_code::GO_AWAY, "Go away!");
    }
}
