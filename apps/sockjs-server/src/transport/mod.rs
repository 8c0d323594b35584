//! Transport endpoints under `/<server_id>/<session_id>/<transport>`.

pub mod framing;
pub mod http;
mod receive;
mod send;
mod websocket;

use std::fmt;
use std::str::FromStr;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::routing::{any, get, post};
use axum::Router;

use crate::config::ServiceOptions;
use crate::error::SockJsError;
use crate::ServiceState;

pub use framing::Framing;

/// Transport families that can be switched off per service. Each one
/// covers its receive endpoints together with the matching send endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// `xhr`, `xhr_streaming` and `xhr_send`.
    Xhr,
    EventSource,
    HtmlFile,
    /// `jsonp` and `jsonp_send`.
    Jsonp,
    /// The framed and the raw websocket endpoints.
    WebSocket,
}

impl Transport {
    pub const ALL: [Transport; 5] = [
        Transport::Xhr,
        Transport::EventSource,
        Transport::HtmlFile,
        Transport::Jsonp,
        Transport::WebSocket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Transport::Xhr => "xhr",
            Transport::EventSource => "eventsource",
            Transport::HtmlFile => "htmlfile",
            Transport::Jsonp => "jsonp",
            Transport::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transport `{0}`")]
pub struct UnknownTransport(String);

impl FromStr for Transport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|transport| transport.name() == name)
            .ok_or_else(|| UnknownTransport(s.to_string()))
    }
}

/// The `server_id`/`session_id` pair of a session URL. `server_id` is
/// accepted for load balancers and otherwise ignored.
#[derive(Debug, Clone)]
pub struct SessionPath {
    pub server_id: String,
    pub session_id: String,
}

impl SessionPath {
    fn valid_segment(segment: &str) -> bool {
        !segment.is_empty() && !segment.contains('.')
    }
}

impl<S: Send + Sync> FromRequestParts<S> for SessionPath {
    type Rejection = SockJsError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((server_id, session_id)) = Path::<(String, String)>::from_request_parts(parts, state)
            .await
            .map_err(|_| SockJsError::MalformedPath)?;

        if !Self::valid_segment(&server_id) || !Self::valid_segment(&session_id) {
            return Err(SockJsError::MalformedPath);
        }
        Ok(Self {
            server_id,
            session_id,
        })
    }
}

/// Session-scoped routes for every transport the service has enabled.
pub fn session_router(options: &ServiceOptions) -> Router<ServiceState> {
    let mut router = Router::new();

    if options.is_enabled(Transport::Xhr) {
        router = router
            .route(
                "/{server_id}/{session_id}/xhr",
                post(receive::xhr).options(|| async { http::preflight("OPTIONS, POST") }),
            )
            .route(
                "/{server_id}/{session_id}/xhr_streaming",
                post(receive::xhr_streaming).options(|| async { http::preflight("OPTIONS, POST") }),
            )
            .route(
                "/{server_id}/{session_id}/xhr_send",
                post(send::xhr_send).options(|| async { http::preflight("OPTIONS, POST") }),
            );
    }
    if options.is_enabled(Transport::EventSource) {
        router = router.route(
            "/{server_id}/{session_id}/eventsource",
            get(receive::eventsource).options(|| async { http::preflight("OPTIONS, GET") }),
        );
    }
    if options.is_enabled(Transport::HtmlFile) {
        router = router.route(
            "/{server_id}/{session_id}/htmlfile",
            get(receive::htmlfile).options(|| async { http::preflight("OPTIONS, GET") }),
        );
    }
    if options.is_enabled(Transport::Jsonp) {
        router = router
            .route(
                "/{server_id}/{session_id}/jsonp",
                get(receive::jsonp).options(|| async { http::preflight("OPTIONS, GET") }),
            )
            .route(
                "/{server_id}/{session_id}/jsonp_send",
                post(send::jsonp_send).options(|| async { http::preflight("OPTIONS, POST") }),
            );
    }
    if options.is_enabled(Transport::WebSocket) {
        router = router.route("/{server_id}/{session_id}/websocket", any(websocket::framed));
    }
    router
}

/// The unframed `/websocket` endpoint, when websockets are enabled.
pub fn raw_router(options: &ServiceOptions) -> Router<ServiceState> {
    if options.is_enabled(Transport::WebSocket) {
        Router::new().route("/websocket", any(websocket::raw))
    } else {
        Router::new()
    }
}
