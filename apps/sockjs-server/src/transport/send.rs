//! Client-to-server send endpoints (`xhr_send`, `jsonp_send`).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use sockjs_common::decode_messages;

use super::http::{NO_CACHE, PLAIN_TEXT};
use super::SessionPath;
use crate::error::SockJsError;
use crate::session::Session;
use crate::ServiceState;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Form body posted by jsonp clients; the payload travels in `d`.
#[derive(Debug, Deserialize)]
struct SendForm {
    d: Option<String>,
}

pub(super) async fn xhr_send(
    State(state): State<ServiceState>,
    path: SessionPath,
    body: Bytes,
) -> Result<Response, SockJsError> {
    let session = lookup(&state, &path)?;
    let payload = std::str::from_utf8(&body).map_err(|_| SockJsError::BrokenJson)?;
    deliver(&session, payload)?;

    Ok((
        StatusCode::NO_CONTENT,
        [(CONTENT_TYPE, PLAIN_TEXT), (CACHE_CONTROL, NO_CACHE)],
    )
        .into_response())
}

pub(super) async fn jsonp_send(
    State(state): State<ServiceState>,
    path: SessionPath,
    request: Request,
) -> Result<Response, SockJsError> {
    let session = lookup(&state, &path)?;

    let media_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase());
    let payload = match media_type.as_deref() {
        Some(FORM_URLENCODED) => {
            let Form(form) = Form::<SendForm>::from_request(request, &state)
                .await
                .map_err(|_| SockJsError::BrokenJson)?;
            form.d.unwrap_or_default()
        }
        Some("text/plain") => {
            let body = Bytes::from_request(request, &state)
                .await
                .map_err(|_| SockJsError::BrokenJson)?;
            String::from_utf8(body.to_vec()).map_err(|_| SockJsError::BrokenJson)?
        }
        _ => return Err(SockJsError::InvalidContentType),
    };
    deliver(&session, &payload)?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, PLAIN_TEXT), (CACHE_CONTROL, NO_CACHE)],
        "ok",
    )
        .into_response())
}

/// Sends only reach sessions that exist and still accept messages.
fn lookup(state: &ServiceState, path: &SessionPath) -> Result<Arc<Session>, SockJsError> {
    state
        .registry
        .get(&path.session_id)
        .filter(|session| session.close_reason().is_none())
        .ok_or(SockJsError::UnknownSession)
}

fn deliver(session: &Session, payload: &str) -> Result<(), SockJsError> {
    if payload.is_empty() {
        return Err(SockJsError::EmptyPayload);
    }
    let messages = decode_messages(payload)?;
    tracing::trace!(session_id = %session.id(), count = messages.len(), "inbound messages");
    session
        .push_inbound(messages)
        .map_err(|_| SockJsError::UnknownSession)
}
