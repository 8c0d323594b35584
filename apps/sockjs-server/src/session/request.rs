//! What a session remembers about the request that opened it.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};

/// URI, headers and peer address of the request that created a session.
///
/// Cookies are stripped. The peer address is only known when the server
/// was started with `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl RequestInfo {
    pub fn new(uri: Uri, mut headers: HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        headers.remove(COOKIE);
        Self {
            uri,
            headers,
            remote_addr,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::new(parts.uri.clone(), parts.headers.clone(), remote_addr))
    }
}
