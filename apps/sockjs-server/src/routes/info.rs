use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use serde::Serialize;

use crate::transport::http::{preflight, NO_CACHE};
use crate::transport::Transport;
use crate::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route(
        "/info",
        get(info).options(|| async { preflight("OPTIONS, GET") }),
    )
}

/// Capabilities a client checks before choosing a transport.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub websocket: bool,
    pub cookie_needed: bool,
    pub origins: Vec<&'static str>,
    /// Fresh per request.
    pub entropy: u32,
}

async fn info(State(state): State<ServiceState>) -> impl IntoResponse {
    let body = InfoResponse {
        websocket: state.options.is_enabled(Transport::WebSocket),
        cookie_needed: state.options.cookie_needed,
        origins: vec!["*:*"],
        entropy: rand::thread_rng().gen(),
    };
    (
        [
            (CONTENT_TYPE, "application/json; charset=UTF-8"),
            (CACHE_CONTROL, NO_CACHE),
        ],
        Json(body),
    )
}
